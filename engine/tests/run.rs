use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use engine::{Engine, Event, Process, Result, State, handler_fn, handlers::TerminateOnNan};
use machine_learning::data::{Batch, DataLoader, Dataset, Sampler};
use ndarray::Array2;

/// Records the first sample of every batch it sees.
#[derive(Default)]
struct Recorder {
    seen: Vec<f32>,
    events: Vec<(&'static str, usize)>,
    nan_at: Option<usize>,
}

#[async_trait]
impl Process for Recorder {
    async fn process(&mut self, state: &mut State, batch: Batch) -> Result<BTreeMap<String, f32>> {
        self.seen.push(batch.x[[0, 0]]);

        let loss = if self.nan_at == Some(state.iteration) {
            f32::NAN
        } else {
            1.0
        };
        Ok(BTreeMap::from([("batch loss".to_string(), loss)]))
    }
}

fn loader() -> DataLoader {
    let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f32);
    let dataset = Arc::new(Dataset::new(x, vec![0; 12], 1).unwrap());
    DataLoader::new(dataset, Sampler::Random { seed: 3 }, 3, true, 0).unwrap()
}

fn record(name: &'static str) -> impl FnMut(&mut State, &mut Recorder) -> Result<()> + Send {
    move |state, rec| {
        rec.events.push((name, state.iteration));
        Ok(())
    }
}

#[tokio::test]
async fn events_fire_in_order_with_filters() {
    let mut engine = Engine::new();
    engine.add_event_handler(Event::Started, handler_fn(record("started")));
    engine.add_event_handler(Event::EpochCompleted.every(2), handler_fn(record("epoch")));
    engine.add_event_handler(Event::IterationCompleted.every(5), handler_fn(record("iter")));
    engine.add_event_handler(Event::Completed, handler_fn(record("completed")));

    let mut rec = Recorder::default();
    let state = engine.run(&mut rec, &loader(), 3).await.unwrap();
    assert_eq!((state.epoch, state.iteration), (3, 12));

    assert_eq!(
        rec.events,
        vec![
            ("started", 0),
            ("iter", 5),
            ("epoch", 8),
            ("iter", 10),
            ("completed", 12)
        ]
    );
}

#[tokio::test]
async fn terminate_stops_after_the_current_iteration() {
    let mut engine = Engine::new();
    engine.add_event_handler(
        Event::IterationStarted.once(6),
        handler_fn(|state: &mut State, _: &mut Recorder| {
            state.terminate();
            Ok(())
        }),
    );
    engine.add_event_handler(Event::Terminate, handler_fn(record("terminate")));
    engine.add_event_handler(Event::EpochCompleted, handler_fn(record("epoch")));
    engine.add_event_handler(Event::Completed, handler_fn(record("completed")));

    let mut rec = Recorder::default();
    let state = engine.run(&mut rec, &loader(), 3).await.unwrap();

    assert_eq!(state.iteration, 6);
    assert_eq!(rec.seen.len(), 6);
    assert_eq!(
        rec.events,
        vec![("epoch", 4), ("terminate", 6), ("completed", 6)]
    );
}

#[tokio::test]
async fn resumed_runs_see_the_same_batches() {
    let mut full = Recorder::default();
    Engine::new().run(&mut full, &loader(), 3).await.unwrap();

    // Interrupted at iteration 5 then resumed from a state restored at 5.
    let mut first = Recorder::default();
    let mut engine = Engine::new();
    engine.add_event_handler(
        Event::IterationStarted.once(5),
        handler_fn(|state: &mut State, _: &mut Recorder| {
            state.terminate();
            Ok(())
        }),
    );
    engine.run(&mut first, &loader(), 3).await.unwrap();

    let mut resumed = Engine::new();
    resumed.state_mut().iteration = 5;
    let mut second = Recorder::default();
    let state = resumed.run(&mut second, &loader(), 3).await.unwrap();
    assert_eq!((state.epoch, state.iteration), (3, 12));

    first.seen.extend(second.seen);
    assert_eq!(first.seen, full.seen);
}

#[tokio::test]
async fn nan_output_terminates() {
    let mut engine = Engine::new();
    engine.add_event_handler(Event::IterationCompleted, TerminateOnNan);

    let mut rec = Recorder {
        nan_at: Some(7),
        ..Default::default()
    };
    let state = engine.run(&mut rec, &loader(), 3).await.unwrap();
    assert_eq!(state.iteration, 7);
}

#[tokio::test]
async fn a_finished_state_runs_no_iteration() {
    let mut engine = Engine::new();
    engine.state_mut().iteration = 12;

    let mut rec = Recorder::default();
    engine.run(&mut rec, &loader(), 3).await.unwrap();
    assert!(rec.seen.is_empty());
}
