use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::info;

use super::{Bundle, DiskSaver};
use crate::{Handler, Result, State};

type ToSave<C> = Box<dyn Fn(&State, &C) -> Result<Bundle> + Send>;
type ScoreFn<C> = Box<dyn Fn(&State, &C) -> Option<f64> + Send>;

#[derive(Debug, Clone)]
struct Saved {
    priority: f64,
    filename: String,
}

/// Saves checkpoints and keeps the `n_saved` ones with the highest priority.
///
/// The priority is the score when there is a score function and the global
/// iteration otherwise.
pub struct Checkpoint<C> {
    to_save: ToSave<C>,
    saver: DiskSaver,
    prefix: String,
    name: String,
    n_saved: Option<usize>,
    score: Option<(String, ScoreFn<C>)>,
    /// Ascending by priority.
    saved: Vec<Saved>,
}

impl<C> Checkpoint<C> {
    /// Creates a new `Checkpoint` handler.
    ///
    /// # Arguments
    /// * `to_save` - Builds the bundle to write.
    /// * `saver` - Where the files go.
    /// * `prefix` - The file name prefix.
    /// * `name` - The file name stem following the prefix.
    /// * `n_saved` - How many files to keep, `None` keeps them all.
    pub fn new<F>(
        to_save: F,
        saver: DiskSaver,
        prefix: impl Into<String>,
        name: impl Into<String>,
        n_saved: Option<usize>,
    ) -> Self
    where
        F: Fn(&State, &C) -> Result<Bundle> + Send + 'static,
    {
        Self {
            to_save: Box::new(to_save),
            saver,
            prefix: prefix.into(),
            name: name.into(),
            n_saved: n_saved.map(|n| n.max(1)),
            score: None,
            saved: Vec::new(),
        }
    }

    /// Ranks the files by `score` instead of by iteration. A `None` score skips the save.
    pub fn with_score<F>(mut self, score_name: impl Into<String>, score: F) -> Self
    where
        F: Fn(&State, &C) -> Option<f64> + Send + 'static,
    {
        self.score = Some((score_name.into(), Box::new(score)));
        self
    }

    /// The kept file names, worst first.
    pub fn saved_files(&self) -> Vec<&str> {
        self.saved.iter().map(|s| s.filename.as_str()).collect()
    }

    /// The path of the best kept file.
    pub fn last_checkpoint(&self) -> Option<PathBuf> {
        self.saved
            .last()
            .map(|s| self.saver.dirname().join(&s.filename))
    }

    pub fn dirname(&self) -> &Path {
        self.saver.dirname()
    }

    fn save(&mut self, state: &State, ctx: &C) -> Result<()> {
        let (priority, filename) = match &self.score {
            Some((score_name, score)) => {
                let Some(priority) = score(state, ctx) else {
                    return Ok(());
                };

                let filename = format!(
                    "{}_{}_{}_{score_name}={priority:.4}.ckpt",
                    self.prefix, self.name, state.epoch
                );
                (priority, filename)
            }
            None => {
                let filename = format!("{}_{}_{}.ckpt", self.prefix, self.name, state.iteration);
                (state.iteration as f64, filename)
            }
        };

        if self.saved.iter().any(|s| s.filename == filename) {
            return Ok(());
        }

        if let (Some(n_saved), Some(worst)) = (self.n_saved, self.saved.first()) {
            if self.saved.len() >= n_saved && priority <= worst.priority {
                return Ok(());
            }
        }

        let bundle = (self.to_save)(state, ctx)?;
        self.saver.save(&bundle, &filename)?;
        info!(iteration = state.iteration; "saved {filename}");

        self.saved.push(Saved { priority, filename });
        self.saved.sort_by(|a, b| a.priority.total_cmp(&b.priority));

        if let Some(n_saved) = self.n_saved {
            while self.saved.len() > n_saved {
                let worst = self.saved.remove(0);
                self.saver.remove(&worst.filename)?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<C: Send> Handler<C> for Checkpoint<C> {
    async fn handle(&mut self, state: &mut State, ctx: &mut C) -> Result<()> {
        self.save(state, ctx)
    }
}

/// Keeps the `n_saved` best models by a validation metric.
///
/// Files are named `best_model_{epoch}_{tag}_{metric_name}={score}.ckpt`.
///
/// # Arguments
/// * `saver` - Where the files go.
/// * `to_save` - Builds the bundle holding the model.
/// * `score` - Reads the metric from the run context, `None` if not computed yet.
/// * `metric_name` - The metric's name.
/// * `n_saved` - How many models to keep.
/// * `tag` - The name of the evaluated split.
pub fn save_best_model_by_val_score<C, F, S>(
    saver: DiskSaver,
    to_save: F,
    score: S,
    metric_name: &str,
    n_saved: usize,
    tag: &str,
) -> Checkpoint<C>
where
    F: Fn(&State, &C) -> Result<Bundle> + Send + 'static,
    S: Fn(&C) -> Option<f64> + Send + 'static,
{
    Checkpoint::new(to_save, saver, "best", "model", Some(n_saved))
        .with_score(format!("{tag}_{metric_name}"), move |_, ctx| score(ctx))
}
