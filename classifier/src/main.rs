use clap::Parser;
use classifier::{
    Config,
    cli::{Cli, Command},
};
use log::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let Cli { command } = Cli::parse();

    match command {
        Command::Run(args) => {
            let config = Config::from(args);
            let outcomes = classifier::run(config).await?;

            for outcome in &outcomes {
                match &outcome.error {
                    Some(_) => warn!(rank = outcome.rank; "participant ended early"),
                    None => info!(
                        rank = outcome.rank,
                        iteration = outcome.iteration;
                        "participant done"
                    ),
                }
            }

            if let Some(Some(metrics)) = outcomes.first().map(|o| &o.test_metrics) {
                info!("final test metrics: {metrics:?}");
            }
        }
    }

    Ok(())
}
