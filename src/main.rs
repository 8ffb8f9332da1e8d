use dotenvy::dotenv;
use log::{error, info, warn};

use pow_ledger::{Config, NodeState, PeerChain};

fn main() {
    let _ = dotenv();
    env_logger::init();

    let config = Config::from_env();
    println!(
        "⛓️ Starting ledger node {} (difficulty {})",
        config.node_id, config.difficulty
    );

    let node = NodeState::new(&config);
    for peer in &config.peers {
        if let Err(e) = node.register_node(peer) {
            warn!("{}", e);
        }
    }
    if !config.peers.is_empty() {
        warn!(
            "{} peer(s) registered but this binary has no sync transport; peer chains are not fetched",
            config.peers.len()
        );
    }

    for _ in 0..config.mine_blocks {
        match node.mine() {
            Ok(block) => info!("block #{} proof={}", block.index, block.proof),
            Err(e) => {
                error!("mining stopped: {}", e);
                std::process::exit(1);
            }
        }
    }

    let chain = match node.chain_snapshot() {
        Ok(chain) => chain,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    match node.is_chain_valid() {
        Ok(valid) => info!("chain of {} blocks valid={}", chain.len(), valid),
        Err(e) => warn!("chain validation failed: {}", e),
    }

    let resp = PeerChain {
        length: chain.len(),
        chain,
    };
    match serde_json::to_string_pretty(&resp) {
        Ok(json) => println!("{json}"),
        Err(e) => error!("could not render chain: {}", e),
    }
}
