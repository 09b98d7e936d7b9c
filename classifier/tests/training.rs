use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use classifier::{ClassifierErr, Config, Outcome, run};
use distributed::{Backend, LaunchOptions};
use engine::EngineErr;

fn config(root: &Path, output: &str) -> Config {
    Config {
        data_path: root.join("blobs"),
        output_path: root.join(output),
        model: "mlp".into(),
        batch_size: 256,
        num_workers: 2,
        num_epochs: 2,
        learning_rate: 0.1,
        num_warmup_epochs: 1,
        validate_every: 1,
        checkpoint_every: 5,
        log_every_iters: 3,
        ..Config::default()
    }
}

fn local(config: Config, world_size: usize) -> Config {
    Config {
        backend: Backend::Local,
        launch: LaunchOptions {
            num_procs_per_node: Some(world_size),
            ..LaunchOptions::default()
        },
        ..config
    }
}

fn checkpoint(outcome: &Outcome, iteration: usize) -> PathBuf {
    outcome
        .output_path
        .join(format!("training_checkpoint_{iteration}.ckpt"))
}

/// Runs `base` once straight through and once stopped at `stop` then resumed.
async fn straight_and_resumed(base: Config, stop: usize) -> (Vec<Outcome>, Vec<Outcome>) {
    let straight = run(base.clone()).await.unwrap();

    let stopped = run(Config {
        output_path: base.output_path.join("stopped"),
        stop_iteration: Some(stop),
        ..base.clone()
    })
    .await
    .unwrap();

    for outcome in &stopped {
        assert!(outcome.error.is_none());
        assert_eq!(outcome.iteration, stop);
    }

    let resume_from = checkpoint(&stopped[0], stop);
    assert!(resume_from.exists(), "{}", resume_from.display());

    let resumed = run(Config {
        output_path: base.output_path.join("resumed"),
        resume_from: Some(resume_from),
        ..base
    })
    .await
    .unwrap();

    (straight, resumed)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serial_resume_follows_the_same_trajectory() {
    let dir = tempfile::tempdir().unwrap();
    let (straight, resumed) = straight_and_resumed(config(dir.path(), "out"), 10).await;

    assert_eq!(straight.len(), 1);
    assert_eq!(resumed.len(), 1);
    assert!(straight[0].error.is_none());
    assert!(resumed[0].error.is_none());

    assert_eq!(resumed[0].iteration, straight[0].iteration);
    assert_eq!(resumed[0].epoch, 2);
    assert_eq!(resumed[0].params, straight[0].params);
    assert_eq!(resumed[0].saved_batch_loss, straight[0].saved_batch_loss);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn local_group_resume_follows_the_same_trajectory() {
    let dir = tempfile::tempdir().unwrap();
    let base = local(config(dir.path(), "out"), 2);
    let (straight, resumed) = straight_and_resumed(base, 7).await;

    assert_eq!(straight.len(), 2);
    assert_eq!(straight[0].params, straight[1].params);
    assert_eq!(resumed[0].params, resumed[1].params);
    assert_eq!(resumed[0].params, straight[0].params);

    // Only rank 0 moves into the run directory.
    assert_ne!(straight[0].output_path, straight[1].output_path);
    assert!(straight[0].output_path.join("config.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stopping_leaves_a_resumable_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let base = Config {
        stop_iteration: Some(10),
        ..config(dir.path(), "out")
    };

    let stopped = run(base.clone()).await.unwrap();
    let run_dir = &stopped[0].output_path;
    assert!(run_dir.ends_with("mlp_backend-none-1_stop-on-10"));

    let checkpoints: Vec<String> = std::fs::read_dir(run_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.starts_with("training_"))
        .collect();
    assert_eq!(checkpoints, ["training_checkpoint_10.ckpt"]);

    let resumed = run(Config {
        stop_iteration: None,
        resume_from: Some(checkpoint(&stopped[0], 10)),
        ..base
    })
    .await
    .unwrap();

    let epoch_length = 4096 / 256;
    assert!(resumed[0].error.is_none());
    assert_eq!(resumed[0].iteration, 2 * epoch_length);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn validation_keeps_the_best_models() {
    let dir = tempfile::tempdir().unwrap();
    let outcomes = run(config(dir.path(), "out")).await.unwrap();

    let metrics = outcomes[0].test_metrics.as_ref().unwrap();
    assert!(metrics["accuracy"] > 0.5, "{metrics:?}");
    assert!(metrics["loss"].is_finite());

    let best: Vec<String> = std::fs::read_dir(&outcomes[0].output_path)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| name.starts_with("best_model_"))
        .collect();
    assert!(!best.is_empty() && best.len() <= 3, "{best:?}");
    assert!(best.iter().all(|name| name.contains("_test_accuracy=")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_logging_never_captures_the_loss() {
    let dir = tempfile::tempdir().unwrap();
    let outcomes = run(Config {
        log_every_iters: 0,
        num_epochs: 1,
        ..config(dir.path(), "out")
    })
    .await
    .unwrap();

    assert!(outcomes[0].error.is_none());
    assert_eq!(outcomes[0].saved_batch_loss, -1.0);
    assert_eq!(outcomes[0].last_output["batch loss"], -1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn captured_loss_is_reported_between_captures() {
    let dir = tempfile::tempdir().unwrap();
    let outcomes = run(Config {
        num_epochs: 1,
        ..config(dir.path(), "out")
    })
    .await
    .unwrap();

    // 16 iterations with a capture every 3: the last capture was iteration 16.
    let outcome = &outcomes[0];
    assert_eq!(outcome.iteration, 16);
    assert_ne!(outcome.saved_batch_loss, -1.0);
    assert_eq!(outcome.last_output["batch loss"], outcome.saved_batch_loss);
}

/// Puts a non-empty directory where the checkpoint of iteration 5 goes.
fn block_checkpoint(run_dir: PathBuf) {
    let blocked = run_dir.join("training_checkpoint_5.ckpt");
    std::fs::create_dir_all(&blocked).unwrap();
    std::fs::write(blocked.join("occupied"), b"").unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_mid_run_is_reported_in_the_outcome() {
    let dir = tempfile::tempdir().unwrap();
    let base = Config {
        stop_iteration: Some(10),
        ..config(dir.path(), "out")
    };
    block_checkpoint(base.output_path.join("mlp_backend-none-1_stop-on-10"));

    let outcomes = run(base).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].iteration, 5);

    let error = outcomes[0].error.as_deref().unwrap();
    assert!(
        error.starts_with("the training engine failed\n  caused by: io error\n  caused by: "),
        "{error}"
    );
    assert_eq!(error.matches("io error").count(), 1, "{error}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn leader_failing_mid_run_releases_the_other_ranks() {
    let dir = tempfile::tempdir().unwrap();
    let base = local(
        Config {
            stop_iteration: Some(10),
            ..config(dir.path(), "out")
        },
        2,
    );
    block_checkpoint(base.output_path.join("mlp_backend-local-2_stop-on-10"));

    let outcomes = tokio::time::timeout(Duration::from_secs(60), run(base))
        .await
        .expect("the group stayed blocked")
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].iteration, 5);
    let leader = outcomes[0].error.as_deref().unwrap();
    assert!(leader.contains("caused by: io error"), "{leader}");
    let follower = outcomes[1].error.as_deref().unwrap();
    assert!(follower.ends_with("a participant left the group"), "{follower}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn leader_failing_during_setup_ends_the_whole_group() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("taken"), b"").unwrap();

    let result = tokio::time::timeout(
        Duration::from_secs(60),
        run(local(config(dir.path(), "taken"), 2)),
    )
    .await
    .expect("the group stayed blocked");

    assert!(matches!(result, Err(ClassifierErr::Io(_))));
}

#[tokio::test]
async fn resuming_from_a_missing_checkpoint_fails_before_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let result = run(Config {
        resume_from: Some(dir.path().join("nope.ckpt")),
        ..config(dir.path(), "out")
    })
    .await;

    assert!(matches!(
        result,
        Err(ClassifierErr::Engine(EngineErr::MissingCheckpoint(_)))
    ));
}

#[tokio::test]
async fn invalid_configs_are_rejected_before_launching() {
    let dir = tempfile::tempdir().unwrap();
    let result = run(Config {
        model: "resnet18".into(),
        ..config(dir.path(), "out")
    })
    .await;

    assert!(matches!(result, Err(ClassifierErr::InvalidConfig(_))));
}
