use std::{collections::BTreeMap, time::Instant};

use async_trait::async_trait;
use log::{debug, info};
use machine_learning::data::{Batch, DataLoader};

use crate::{
    EngineErr, Result, State,
    events::{Event, EventSet},
    handler::Handler,
};

/// The work done on every batch.
#[async_trait]
pub trait Process: Send {
    /// Processes one batch.
    ///
    /// # Returns
    /// The named scalars of this step, they become `state.output`.
    async fn process(&mut self, state: &mut State, batch: Batch) -> Result<BTreeMap<String, f32>>;
}

/// Runs a `Process` over a loader for a number of epochs, firing events
/// along the way.
pub struct Engine<C: Process> {
    state: State,
    handlers: Vec<(EventSet, Box<dyn Handler<C>>)>,
}

impl<C: Process> Default for Engine<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Process> Engine<C> {
    pub fn new() -> Self {
        Self {
            state: State::default(),
            handlers: Vec::new(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Registers `handler` to run on `events`, handlers run in registration order.
    pub fn add_event_handler<E, H>(&mut self, events: E, handler: H)
    where
        E: Into<EventSet>,
        H: Handler<C> + 'static,
    {
        self.handlers.push((events.into(), Box::new(handler)));
    }

    /// Runs the engine.
    ///
    /// A restored state at iteration `i` resumes in epoch `i / epoch_length`
    /// skipping its first `i % epoch_length` batches.
    ///
    /// # Arguments
    /// * `ctx` - The run context, also the batch processor.
    /// * `loader` - The batches of every epoch.
    /// * `max_epochs` - The amount of epochs to run.
    ///
    /// # Returns
    /// The final state or the first error a step or a handler raised.
    pub async fn run(&mut self, ctx: &mut C, loader: &DataLoader, max_epochs: usize) -> Result<&State> {
        let epoch_length = loader.len();
        if epoch_length == 0 {
            return Err(EngineErr::EmptyLoader);
        }

        if self.state.epoch_length != 0 && self.state.epoch_length != epoch_length {
            return Err(EngineErr::Ml(machine_learning::MlErr::SizeMismatch {
                what: "epoch length",
                got: epoch_length,
                expected: self.state.epoch_length,
            }));
        }

        self.state.epoch_length = epoch_length;
        self.state.max_epochs = max_epochs;
        self.state.epoch = self.state.iteration / epoch_length;
        self.state.should_terminate = false;

        info!(
            epoch = self.state.epoch,
            iteration = self.state.iteration,
            epoch_length = epoch_length,
            max_epochs = max_epochs;
            "engine run starting"
        );
        self.fire(Event::Started, ctx).await?;

        while !self.state.is_done() && !self.state.should_terminate {
            let skip = self.state.iteration % epoch_length;
            self.state.epoch += 1;
            self.fire(Event::EpochStarted, ctx).await?;

            let started = Instant::now();
            for batch in loader.iter_from(self.state.epoch, skip) {
                self.state.iteration += 1;
                self.fire(Event::IterationStarted, ctx).await?;

                self.state.output = ctx.process(&mut self.state, batch).await?;
                self.fire(Event::IterationCompleted, ctx).await?;

                if self.state.should_terminate {
                    break;
                }
            }

            if self.state.should_terminate {
                debug!(iteration = self.state.iteration; "terminate requested");
                self.fire(Event::Terminate, ctx).await?;
                break;
            }

            self.state.epoch_time = Some(started.elapsed());
            self.fire(Event::EpochCompleted, ctx).await?;

            if self.state.should_terminate {
                self.fire(Event::Terminate, ctx).await?;
            }
        }

        self.fire(Event::Completed, ctx).await?;
        Ok(&self.state)
    }

    async fn fire(&mut self, event: Event, ctx: &mut C) -> Result<()> {
        let Self { state, handlers } = self;

        for (events, handler) in handlers.iter_mut() {
            if events.matches(event, state) {
                handler.handle(state, ctx).await?;
            }
        }

        Ok(())
    }
}
