use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use distributed::{Backend, LaunchOptions};

use crate::Config;

/// Trains a classifier on the blobs dataset, on one or many participants.
#[derive(Parser, Debug)]
#[command(name = "classifier", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs a training.
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Random state seed.
    #[arg(long, default_value_t = 543)]
    pub seed: u64,

    /// Where the dataset lives, it is generated there if absent.
    #[arg(long, default_value = "/tmp/blobs")]
    pub data_path: PathBuf,

    #[arg(long, default_value = "/tmp/output-blobs")]
    pub output_path: PathBuf,

    /// One of linear, mlp, mlp-deep, mlp-sigmoid.
    #[arg(long, default_value = "mlp")]
    pub model: String,

    /// Total batch size, split between the ranks.
    #[arg(long, default_value_t = 512)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 0.9)]
    pub momentum: f32,

    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f32,

    /// Prefetching workers of the data loaders.
    #[arg(long, default_value_t = 12)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 24)]
    pub num_epochs: usize,

    /// Peak of the piecewise linear learning rate schedule.
    #[arg(long, default_value_t = 0.4)]
    pub learning_rate: f32,

    #[arg(long, default_value_t = 4)]
    pub num_warmup_epochs: usize,

    /// Validate every this many epochs.
    #[arg(long, default_value_t = 3)]
    pub validate_every: usize,

    /// Store a training checkpoint every this many iterations.
    #[arg(long, default_value_t = 200)]
    pub checkpoint_every: usize,

    /// The communication backend: none, local or tcp.
    #[arg(long, default_value = "none")]
    pub backend: Backend,

    /// A checkpoint to resume the training from.
    #[arg(long)]
    pub resume_from: Option<PathBuf>,

    /// Log the progress every this many iterations, 0 disables it.
    #[arg(long, default_value_t = 15)]
    pub log_every_iters: usize,

    /// Stop the training on this iteration.
    #[arg(long)]
    pub stop_iteration: Option<usize>,

    /// Participants spawned on this node.
    #[arg(long)]
    pub num_procs_per_node: Option<usize>,

    #[arg(long)]
    pub num_nodes: Option<usize>,

    #[arg(long)]
    pub node_rank: Option<usize>,

    #[arg(long)]
    pub master_addr: Option<String>,

    #[arg(long)]
    pub master_port: Option<u16>,
}

impl From<RunArgs> for Config {
    fn from(args: RunArgs) -> Self {
        Self {
            seed: args.seed,
            data_path: args.data_path,
            output_path: args.output_path,
            model: args.model,
            batch_size: args.batch_size,
            momentum: args.momentum,
            weight_decay: args.weight_decay,
            num_workers: args.num_workers,
            num_epochs: args.num_epochs,
            learning_rate: args.learning_rate,
            num_warmup_epochs: args.num_warmup_epochs,
            validate_every: args.validate_every,
            checkpoint_every: args.checkpoint_every,
            backend: args.backend,
            resume_from: args.resume_from,
            log_every_iters: args.log_every_iters,
            stop_iteration: args.stop_iteration,
            launch: LaunchOptions {
                num_procs_per_node: args.num_procs_per_node,
                num_nodes: args.num_nodes,
                node_rank: args.node_rank,
                master_addr: args.master_addr,
                master_port: args.master_port,
            },
        }
    }
}
