use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Local;
use distributed::{
    Context, Parallel,
    auto::{auto_model, sync_gradients},
};
use engine::{
    Engine, Evaluator, Event, Handler, Metrics, Process, State,
    checkpoint::{Bundle, Checkpoint, DiskSaver, load_checkpoint, save_best_model_by_val_score},
    handler_fn,
    handlers::{RunningAverage, TerminateOnNan},
};
use log::{debug, error, info};
use machine_learning::{
    arch::{Network, Sequential, loss::CrossEntropy},
    data::{Batch, DataLoader},
    optimization::{Optimizer, PiecewiseLinear, Sgd},
};
use serde_json::Value;

use crate::{ClassifierErr, Config, Result, dataflow::get_dataflow, models::get_model};

const BATCH_LOSS: &str = "batch loss";

/// What a participant reports once its training is over.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub rank: usize,
    pub epoch: usize,
    pub iteration: usize,
    pub saved_batch_loss: f32,
    /// The step output of the last iteration.
    pub last_output: BTreeMap<String, f32>,
    pub params: Vec<f32>,
    /// The run directory on rank 0, the base output path elsewhere.
    pub output_path: PathBuf,
    pub test_metrics: Option<Metrics>,
    /// The report of the error that ended the run early, if any.
    pub error: Option<String>,
}

/// The training step and everything the handlers need to reach.
struct Trainer {
    ctx: Context,
    network: Network<Sequential>,
    optimizer: Sgd,
    lr_scheduler: PiecewiseLinear,
    loss_fn: CrossEntropy,
    log_every_iters: usize,
    evaluator: Evaluator,
    train_loader: DataLoader,
    test_loader: DataLoader,
    test_metrics: Option<Metrics>,
}

#[async_trait]
impl Process for Trainer {
    async fn process(
        &mut self,
        state: &mut State,
        batch: Batch,
    ) -> engine::Result<BTreeMap<String, f32>> {
        let loss = self
            .network
            .backprop(&self.loss_fn, batch.x.view(), &batch.y)?;
        sync_gradients(&mut self.network, &mut self.ctx).await?;

        let (params, grad) = self.network.params_and_grad();
        self.optimizer.update_params(params, grad)?;

        let batch_loss = if self.log_every_iters > 0
            && (state.iteration - 1) % self.log_every_iters == 0
        {
            state.saved_batch_loss = loss;
            loss
        } else {
            state.saved_batch_loss
        };

        Ok(BTreeMap::from([(BATCH_LOSS.to_string(), batch_loss)]))
    }
}

/// Evaluates on both splits and keeps the test metrics for the best model handler.
struct Validation;

#[async_trait]
impl Handler<Trainer> for Validation {
    async fn handle(&mut self, state: &mut State, trainer: &mut Trainer) -> engine::Result<()> {
        let epoch = state.epoch;

        let metrics = trainer
            .evaluator
            .run(&trainer.network, &trainer.train_loader, &mut trainer.ctx)
            .await?;
        print_metrics(&trainer.ctx, epoch, "Train", &metrics);

        let metrics = trainer
            .evaluator
            .run(&trainer.network, &trainer.test_loader, &mut trainer.ctx)
            .await?;
        print_metrics(&trainer.ctx, epoch, "Test", &metrics);

        trainer.test_metrics = Some(metrics);
        Ok(())
    }
}

fn print_metrics(ctx: &Context, epoch: usize, tag: &str, metrics: &Metrics) {
    if !ctx.is_leader() {
        return;
    }

    let lines: Vec<String> = metrics.iter().map(|(k, v)| format!("\t{k}: {v}")).collect();
    info!("Epoch {epoch} - {tag} metrics:\n{}", lines.join("\n"));
}

/// Names the run directory, e.g. `mlp_backend-local-4_20240101-120000`.
fn run_dir_name(config: &Config, ctx: &Context) -> String {
    let now = match config.stop_iteration {
        Some(n) => format!("stop-on-{n}"),
        None => Local::now().format("%Y%m%d-%H%M%S").to_string(),
    };

    format!(
        "{}_backend-{}-{}_{now}",
        config.model,
        ctx.backend(),
        ctx.world_size()
    )
}

fn log_configuration(config: &Config, ctx: &Context) -> Result<()> {
    info!("Train {} on blobs", config.model);
    info!("- classifier version: {}", env!("CARGO_PKG_VERSION"));

    if let Value::Object(entries) = serde_json::to_value(config)? {
        let lines: Vec<String> = entries
            .iter()
            .map(|(k, v)| format!("\t{k}: {v}"))
            .collect();
        info!("Configuration:\n{}", lines.join("\n"));
    }

    if ctx.world_size() > 1 {
        info!(
            "Distributed setting:\n\tbackend: {}\n\tworld size: {}",
            ctx.backend(),
            ctx.world_size()
        );
    }

    Ok(())
}

/// Creates the run directory on rank 0 and stores the configuration in it.
fn prepare_output(config: &mut Config, ctx: &Context) -> Result<()> {
    if !ctx.is_leader() {
        return Ok(());
    }

    let output_path = config.output_path.join(run_dir_name(config, ctx));
    fs::create_dir_all(&output_path)?;
    config.output_path = output_path;
    info!("Output path: {}", config.output_path.display());

    let file = fs::File::create(config.output_path.join("config.json"))?;
    serde_json::to_writer_pretty(file, &*config)?;
    Ok(())
}

fn training_bundle(state: &State, trainer: &Trainer) -> engine::Result<Bundle> {
    let mut bundle = Bundle::new();
    bundle.insert("trainer", state)?;
    bundle.insert("model", &trainer.network)?;
    bundle.insert("optimizer", &trainer.optimizer)?;
    bundle.insert("lr_scheduler", &trainer.lr_scheduler)?;
    Ok(bundle)
}

fn model_bundle(_: &State, trainer: &Trainer) -> engine::Result<Bundle> {
    let mut bundle = Bundle::new();
    bundle.insert("model", &trainer.network)?;
    Ok(bundle)
}

fn resume(path: &Path, engine: &mut Engine<Trainer>, trainer: &mut Trainer) -> Result<()> {
    if trainer.ctx.is_leader() {
        info!("Resume from a checkpoint: {}", path.display());
    }

    let bundle = load_checkpoint(path)?;
    bundle.restore("trainer", engine.state_mut())?;
    bundle.restore("model", &mut trainer.network)?;
    bundle.restore("optimizer", &mut trainer.optimizer)?;
    bundle.restore("lr_scheduler", &mut trainer.lr_scheduler)?;
    Ok(())
}

/// Registers the handlers of a run on `engine`, in the order they fire.
fn setup_handlers(
    engine: &mut Engine<Trainer>,
    config: &Config,
    is_leader: bool,
) -> Result<()> {
    engine.add_event_handler(
        Event::IterationStarted,
        handler_fn(|_: &mut State, trainer: &mut Trainer| {
            trainer.lr_scheduler.apply(&mut trainer.optimizer);
            Ok(())
        }),
    );
    engine.add_event_handler(Event::IterationCompleted, TerminateOnNan);

    let saver = DiskSaver::new(&config.output_path, is_leader)?;
    engine.add_event_handler(
        Event::IterationCompleted.every(config.checkpoint_every) | Event::Terminate,
        Checkpoint::new(training_bundle, saver, "training", "checkpoint", Some(1)),
    );

    if config.log_every_iters > 0 {
        engine.add_event_handler(
            Event::IterationCompleted,
            RunningAverage::new(BATCH_LOSS, 0.98),
        );
        engine.add_event_handler(
            Event::IterationCompleted.every(config.log_every_iters),
            handler_fn(|state: &mut State, trainer: &mut Trainer| {
                if trainer.ctx.is_leader() {
                    let in_epoch = (state.iteration - 1) % state.epoch_length + 1;
                    info!(
                        epoch = state.epoch,
                        iteration = state.iteration;
                        "Epoch [{}/{}] [{in_epoch}/{}] {BATCH_LOSS}: {:.4} lr: {:.5}",
                        state.epoch,
                        state.max_epochs,
                        state.epoch_length,
                        state.metrics.get(BATCH_LOSS).copied().unwrap_or(f32::NAN),
                        trainer.optimizer.learning_rate()
                    );
                }
                Ok(())
            }),
        );
    }

    engine.add_event_handler(
        Event::EpochCompleted,
        handler_fn(|state: &mut State, trainer: &mut Trainer| {
            if let Some(elapsed) = state.epoch_time {
                if trainer.ctx.is_leader() {
                    info!(epoch = state.epoch; "Epoch [{}] complete, time taken: {elapsed:.3?}", state.epoch);
                }
            }
            Ok(())
        }),
    );

    let validation_events = Event::EpochCompleted.every(config.validate_every) | Event::Completed;
    engine.add_event_handler(validation_events.clone(), Validation);

    let saver = DiskSaver::new(&config.output_path, is_leader)?;
    engine.add_event_handler(
        validation_events,
        save_best_model_by_val_score(
            saver,
            model_bundle,
            |trainer: &Trainer| {
                trainer
                    .test_metrics
                    .as_ref()
                    .and_then(|m| m.get("accuracy").copied())
            },
            "accuracy",
            3,
            "test",
        ),
    );

    if let Some(stop_iteration) = config.stop_iteration {
        engine.add_event_handler(
            Event::IterationStarted.once(stop_iteration),
            handler_fn(|state: &mut State, _: &mut Trainer| {
                info!("Stop training on {} iteration", state.iteration);
                state.terminate();
                Ok(())
            }),
        );
    }

    Ok(())
}

/// Trains the configured model on this participant.
///
/// Errors raised while the engine runs are logged and end the run early, they
/// are reported in the outcome instead of being returned.
///
/// # Arguments
/// * `local_rank` - The participant's rank on its node.
/// * `ctx` - The participant's context.
/// * `config` - The run configuration.
///
/// # Returns
/// The outcome of the run, or an error if it could not be set up, e.g. when
/// the checkpoint to resume from does not exist.
pub async fn training(local_rank: usize, mut ctx: Context, mut config: Config) -> Result<Outcome> {
    let rank = ctx.rank();
    debug!(rank = rank, local_rank = local_rank; "participant starting");

    if ctx.is_leader() {
        log_configuration(&config, &ctx)?;
    }
    prepare_output(&mut config, &ctx)?;

    let (train_loader, test_loader) = get_dataflow(&config, &mut ctx).await?;
    let dataset = train_loader.dataset();
    let model = get_model(&config.model, dataset.features(), dataset.classes())?;

    let mut network = Network::new(model, config.seed + rank as u64)?;
    auto_model(&mut network, &mut ctx).await?;

    let optimizer = Sgd::new(
        config.learning_rate,
        config.momentum,
        config.weight_decay,
        true,
    );

    let le = train_loader.len();
    let lr_scheduler = PiecewiseLinear::new(vec![
        (0, 0.0),
        (le * config.num_warmup_epochs, config.learning_rate),
        (le * config.num_epochs, 0.0),
    ])?;

    let is_leader = ctx.is_leader();
    let mut trainer = Trainer {
        ctx,
        network,
        optimizer,
        lr_scheduler,
        loss_fn: CrossEntropy,
        log_every_iters: config.log_every_iters,
        evaluator: Evaluator::default(),
        train_loader: train_loader.clone(),
        test_loader,
        test_metrics: None,
    };

    let mut engine = Engine::new();
    setup_handlers(&mut engine, &config, is_leader)?;

    if let Some(path) = &config.resume_from {
        resume(path, &mut engine, &mut trainer)?;
    }

    let error = match engine
        .run(&mut trainer, &train_loader, config.num_epochs)
        .await
    {
        Ok(_) => None,
        Err(e) => {
            let report = ClassifierErr::from(e).report();
            error!(rank = rank; "training failed: {report}");
            Some(report)
        }
    };

    let state = engine.state();
    if is_leader {
        info!(
            epoch = state.epoch,
            iteration = state.iteration;
            "training finished"
        );
    }

    Ok(Outcome {
        rank,
        epoch: state.epoch,
        iteration: state.iteration,
        saved_batch_loss: state.saved_batch_loss,
        last_output: state.output.clone(),
        params: trainer.network.params().to_vec(),
        output_path: config.output_path,
        test_metrics: trainer.test_metrics,
        error,
    })
}

/// Launches the participants `config` asks for and trains on each of them.
///
/// # Returns
/// The outcomes sorted by local rank, or the first error a participant hit.
pub async fn run(config: Config) -> Result<Vec<Outcome>> {
    config.validate()?;

    let parallel = Parallel::new(config.backend).with_options(&config.launch);
    parallel.run(training, config).await?.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use distributed::LocalGroup;

    use super::*;

    #[test]
    fn run_dir_names_the_model_backend_and_world_size() {
        let config = Config {
            stop_iteration: Some(10),
            ..Config::default()
        };

        let ctx = Context::local(LocalGroup::new(2), 0);
        assert_eq!(run_dir_name(&config, &ctx), "mlp_backend-local-2_stop-on-10");

        let name = run_dir_name(&Config::default(), &Context::serial());
        let stamp = name.strip_prefix("mlp_backend-none-1_").unwrap();
        assert_eq!(stamp.len(), "20240101-120000".len());
    }

    #[test]
    fn only_rank_zero_rewrites_the_output_path() {
        let dir = tempfile::tempdir().unwrap();
        let base = Config {
            output_path: dir.path().to_path_buf(),
            stop_iteration: Some(3),
            ..Config::default()
        };
        let group = LocalGroup::new(2);

        let mut follower = base.clone();
        prepare_output(&mut follower, &Context::local(group.clone(), 1)).unwrap();
        assert_eq!(follower.output_path, base.output_path);

        let mut leader = base.clone();
        prepare_output(&mut leader, &Context::local(group, 0)).unwrap();
        assert_eq!(
            leader.output_path,
            dir.path().join("mlp_backend-local-2_stop-on-3")
        );

        let written: Config =
            serde_json::from_reader(fs::File::open(leader.output_path.join("config.json")).unwrap())
                .unwrap();
        assert_eq!(written, leader);
    }
}
