use std::path::PathBuf;

use clap::Parser;
use edgeplay_core::SimConfig;

/// Cluster load-balancing simulator.
///
/// Spins up a set of simulated nodes, drives them with concurrent clients
/// through the chosen dispatch algorithm and records per-second load data.
#[derive(Parser, Debug, Default)]
#[command(name = "edgeplay", about = "Cluster load-balancing simulator")]
pub struct CliArgs {
    /// Dispatch algorithm: random, round, game or power
    #[arg(long, short)]
    pub algorithm: Option<String>,

    /// Number of simulated nodes
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Number of concurrent client threads
    #[arg(long)]
    pub clients: Option<usize>,

    /// Tasks sent by each client
    #[arg(long)]
    pub requests: Option<usize>,

    /// Path to a TOML config file
    #[arg(long, env = "EDGEPLAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for experiment data files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Seed for node specs, workload and random dispatch
    #[arg(long)]
    pub seed: Option<u64>,
}

impl CliArgs {
    /// Layer explicit flags over the file/env configuration.
    pub fn apply(&self, config: &mut SimConfig) {
        if let Some(ref algorithm) = self.algorithm {
            config.cluster.algorithm = algorithm.clone();
        }
        if let Some(nodes) = self.nodes {
            config.cluster.nodes = nodes;
        }
        if let Some(clients) = self.clients {
            config.cluster.clients = clients;
        }
        if let Some(requests) = self.requests {
            config.cluster.requests_per_client = requests;
        }
        if let Some(ref dir) = self.data_dir {
            config.output.data_dir = dir.clone();
        }
        if self.seed.is_some() {
            config.cluster.seed = self.seed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags() {
        let args = CliArgs::parse_from([
            "edgeplay",
            "--algorithm",
            "game",
            "--nodes",
            "5",
            "--requests",
            "20",
            "--seed",
            "11",
        ]);
        assert_eq!(args.algorithm.as_deref(), Some("game"));
        assert_eq!(args.nodes, Some(5));
        assert_eq!(args.requests, Some(20));
        assert_eq!(args.seed, Some(11));
        assert_eq!(args.clients, None);
    }

    #[test]
    fn flags_override_config_only_when_given() {
        let mut config = SimConfig::default();
        config.cluster.clients = 9;

        let args = CliArgs {
            algorithm: Some("power".into()),
            nodes: Some(2),
            data_dir: Some(PathBuf::from("/tmp/out")),
            ..CliArgs::default()
        };
        args.apply(&mut config);

        assert_eq!(config.cluster.algorithm, "power");
        assert_eq!(config.cluster.nodes, 2);
        assert_eq!(config.cluster.clients, 9);
        assert_eq!(config.output.data_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.cluster.seed, None);
    }
}
