use std::{env, future::Future, sync::Arc, time::Duration};

use log::info;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::{
    Backend, Context, DistErr, Result,
    context::Placement,
    local::LocalGroup,
};

pub const DEFAULT_MASTER_ADDR: &str = "127.0.0.1";
pub const DEFAULT_MASTER_PORT: u16 = 2222;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Launches the participants of a process group and runs a function on each.
///
/// With `nproc_per_node` set, every participant of this node runs as a task of
/// the current process. With the tcp backend and no `nproc_per_node`, the
/// process is assumed to be launched externally and reads its placement from
/// the `RANK`, `LOCAL_RANK`, `WORLD_SIZE`, `MASTER_ADDR` and `MASTER_PORT`
/// environment variables.
#[derive(Debug, Clone)]
pub struct Parallel {
    backend: Backend,
    nproc_per_node: Option<usize>,
    nnodes: usize,
    node_rank: usize,
    master_addr: Option<String>,
    master_port: Option<u16>,
    timeout: Duration,
}

/// The optional launch parameters, as they come from a command line or a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    pub num_procs_per_node: Option<usize>,
    pub num_nodes: Option<usize>,
    pub node_rank: Option<usize>,
    pub master_addr: Option<String>,
    pub master_port: Option<u16>,
}

/// A participant that has not joined the group yet.
enum Participant {
    Serial,
    Local {
        group: Arc<LocalGroup>,
        local_rank: usize,
    },
    Tcp {
        placement: Placement,
        rank: usize,
        world_size: usize,
        addr: String,
    },
}

impl Participant {
    fn local_rank(&self) -> usize {
        match self {
            Participant::Serial => 0,
            Participant::Local { local_rank, .. } => *local_rank,
            Participant::Tcp { placement, .. } => placement.local_rank,
        }
    }

    async fn join(self, timeout: Duration) -> Result<Context> {
        match self {
            Participant::Serial => Ok(Context::serial()),
            Participant::Local { group, local_rank } => Ok(Context::local(group, local_rank)),
            Participant::Tcp {
                placement,
                rank,
                world_size,
                addr,
            } => Context::tcp(placement, rank, world_size, &addr, timeout).await,
        }
    }
}

impl Parallel {
    /// Creates a new `Parallel` launcher for a single node.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            nproc_per_node: None,
            nnodes: 1,
            node_rank: 0,
            master_addr: None,
            master_port: None,
            timeout: CONNECT_TIMEOUT,
        }
    }

    pub fn nproc_per_node(mut self, nproc_per_node: usize) -> Self {
        self.nproc_per_node = Some(nproc_per_node);
        self
    }

    pub fn nnodes(mut self, nnodes: usize) -> Self {
        self.nnodes = nnodes;
        self
    }

    pub fn node_rank(mut self, node_rank: usize) -> Self {
        self.node_rank = node_rank;
        self
    }

    pub fn master_addr(mut self, master_addr: impl Into<String>) -> Self {
        self.master_addr = Some(master_addr.into());
        self
    }

    pub fn master_port(mut self, master_port: u16) -> Self {
        self.master_port = Some(master_port);
        self
    }

    /// Applies whichever launch options are set.
    pub fn with_options(mut self, options: &LaunchOptions) -> Self {
        if let Some(nproc_per_node) = options.num_procs_per_node {
            self = self.nproc_per_node(nproc_per_node);
        }
        if let Some(nnodes) = options.num_nodes {
            self = self.nnodes(nnodes);
        }
        if let Some(node_rank) = options.node_rank {
            self = self.node_rank(node_rank);
        }
        if let Some(master_addr) = &options.master_addr {
            self = self.master_addr(master_addr.as_str());
        }
        if let Some(master_port) = options.master_port {
            self = self.master_port(master_port);
        }
        self
    }

    /// How long non coordinator ranks keep retrying to connect.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Runs `f(local_rank, ctx, config)` on every participant of this node
    /// concurrently and tears the group down once they all return.
    ///
    /// # Arguments
    /// * `f` - The participant's entry point.
    /// * `config` - Cloned into every participant.
    ///
    /// # Returns
    /// The outputs ordered by local rank, or the first error, in which case
    /// the remaining participants are aborted.
    pub async fn run<F, Fut, C, T>(&self, f: F, config: C) -> Result<Vec<T>>
    where
        F: Fn(usize, Context, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        C: Clone + Send + 'static,
        T: Send + 'static,
    {
        let participants = self.participants(|key| env::var(key).ok())?;
        info!(
            backend = self.backend.as_str(),
            participants = participants.len();
            "launching participants"
        );

        let f = Arc::new(f);
        let timeout = self.timeout;
        let mut set = JoinSet::new();

        for participant in participants {
            let f = Arc::clone(&f);
            let config = config.clone();

            set.spawn(async move {
                let local_rank = participant.local_rank();
                let ctx = participant.join(timeout).await?;
                Ok::<_, DistErr>((local_rank, f(local_rank, ctx, config).await))
            });
        }

        // Dropping the set aborts whoever is still running.
        let mut outputs = Vec::with_capacity(set.len());
        while let Some(res) = set.join_next().await {
            outputs.push(res??);
        }

        outputs.sort_by_key(|(local_rank, _)| *local_rank);
        Ok(outputs.into_iter().map(|(_, out)| out).collect())
    }

    fn participants<E>(&self, env: E) -> Result<Vec<Participant>>
    where
        E: Fn(&str) -> Option<String>,
    {
        if self.nnodes == 0 || self.nproc_per_node == Some(0) {
            return invalid("the number of nodes and processes per node must be positive");
        }

        if self.node_rank >= self.nnodes {
            return invalid(format!(
                "node rank {} is out of range for {} nodes",
                self.node_rank, self.nnodes
            ));
        }

        match (self.backend, self.nproc_per_node) {
            (Backend::Serial, nproc) => {
                if nproc.unwrap_or(1) > 1
                    || self.nnodes > 1
                    || self.master_addr.is_some()
                    || self.master_port.is_some()
                {
                    return invalid("the serial backend takes no distributed launch parameters");
                }

                Ok(vec![Participant::Serial])
            }
            (Backend::Local, nproc) => {
                if self.nnodes > 1 {
                    return invalid("the local backend runs on a single node");
                }

                let group = LocalGroup::new(nproc.unwrap_or(1));
                Ok((0..group.world_size())
                    .map(|local_rank| Participant::Local {
                        group: Arc::clone(&group),
                        local_rank,
                    })
                    .collect())
            }
            (Backend::Tcp, Some(nproc_per_node)) => {
                if self.nnodes > 1 && self.master_addr.is_none() {
                    return invalid("a multi node launch needs a master address");
                }

                let addr = socket_addr(
                    self.master_addr.as_deref().unwrap_or(DEFAULT_MASTER_ADDR),
                    self.master_port.unwrap_or(DEFAULT_MASTER_PORT),
                );

                Ok((0..nproc_per_node)
                    .map(|local_rank| {
                        let placement = Placement {
                            local_rank,
                            node_rank: self.node_rank,
                            nproc_per_node,
                            nnodes: self.nnodes,
                        };

                        Participant::Tcp {
                            placement,
                            rank: placement.rank(),
                            world_size: placement.world_size(),
                            addr: addr.clone(),
                        }
                    })
                    .collect())
            }
            (Backend::Tcp, None) => {
                if self.nnodes > 1 || self.node_rank > 0 {
                    return invalid("a multi node launch needs the number of processes per node");
                }

                Ok(vec![self.from_env(env)?])
            }
        }
    }

    /// Reads an externally launched participant's placement.
    fn from_env<E>(&self, env: E) -> Result<Participant>
    where
        E: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| -> Result<usize> {
            let value = env(key).ok_or_else(|| {
                DistErr::InvalidLaunch(format!(
                    "{key} is not set, either set num_procs_per_node or launch externally"
                ))
            })?;

            value
                .parse()
                .map_err(|_| DistErr::InvalidLaunch(format!("{key}={value} is not a number")))
        };

        let rank = var("RANK")?;
        let local_rank = var("LOCAL_RANK")?;
        let world_size = var("WORLD_SIZE")?;
        let nproc_per_node = var("LOCAL_WORLD_SIZE").unwrap_or(world_size);

        if rank >= world_size || local_rank >= nproc_per_node || world_size % nproc_per_node != 0 {
            return Err(DistErr::Inconsistent {
                what: "launch environment",
                got: format!("RANK={rank} LOCAL_RANK={local_rank} WORLD_SIZE={world_size}"),
                expected: format!("ranks within a world of {world_size}"),
            });
        }

        let host = match &self.master_addr {
            Some(addr) => addr.clone(),
            None => env("MASTER_ADDR").unwrap_or_else(|| DEFAULT_MASTER_ADDR.to_string()),
        };
        let port = match self.master_port {
            Some(port) => port,
            None => env("MASTER_PORT")
                .map(|port| {
                    port.parse().map_err(|_| {
                        DistErr::InvalidLaunch(format!("MASTER_PORT={port} is not a port"))
                    })
                })
                .transpose()?
                .unwrap_or(DEFAULT_MASTER_PORT),
        };

        let placement = Placement {
            local_rank,
            node_rank: rank / nproc_per_node,
            nproc_per_node,
            nnodes: world_size / nproc_per_node,
        };

        Ok(Participant::Tcp {
            placement,
            rank,
            world_size,
            addr: socket_addr(&host, port),
        })
    }
}

fn socket_addr(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

fn invalid<T>(detail: impl Into<String>) -> Result<T> {
    Err(DistErr::InvalidLaunch(detail.into()))
}
