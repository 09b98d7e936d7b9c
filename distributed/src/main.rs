use std::collections::BTreeMap;

use clap::Parser;
use distributed::{Backend, LaunchOptions, Parallel, check_rank_sum};
use log::info;

/// Checks that a process group can all reduce across every participant.
#[derive(Parser, Debug)]
#[command(name = "check_parallel", version)]
struct Args {
    /// The communication backend: none, local or tcp.
    #[arg(long, default_value = "none")]
    backend: Backend,

    /// Participants spawned on this node.
    #[arg(long)]
    num_procs_per_node: Option<usize>,

    #[arg(long)]
    num_nodes: Option<usize>,

    #[arg(long)]
    node_rank: Option<usize>,

    #[arg(long)]
    master_addr: Option<String>,

    #[arg(long)]
    master_port: Option<u16>,
}

impl Args {
    fn launch_options(&self) -> LaunchOptions {
        LaunchOptions {
            num_procs_per_node: self.num_procs_per_node,
            num_nodes: self.num_nodes,
            node_rank: self.node_rank,
            master_addr: self.master_addr.clone(),
            master_port: self.master_port,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config: BTreeMap<&str, &str> = [("model", "mlp"), ("lr", "0.01")].into_iter().collect();
    let parallel = Parallel::new(args.backend).with_options(&args.launch_options());

    for sum in parallel.run(check_rank_sum, config).await? {
        let sum = sum?;
        info!(rank_sum = sum; "participant checked");
    }

    info!("every participant agrees");
    Ok(())
}
