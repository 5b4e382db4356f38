use anyhow::Context;
use overwatch_core::{FileProfileStore, Runtime};
use overwatch_server::AppState;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::load_config;

pub fn run(config_path: &Path, port: u16, profile: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    for w in config.validate() {
        tracing::warn!("{}", w.message);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let runtime = Runtime::from_config(&config).context("failed to assemble pipeline")?;
        let mut state = AppState::from_runtime(runtime, &config);
        if let Some(path) = profile {
            state = state.with_profiles(Arc::new(FileProfileStore::new(path)));
        }

        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
        let url = format!("http://localhost:{}", listener.local_addr()?.port());
        println!("overwatch API → {url}");

        tokio::select! {
            res = overwatch_server::serve_on(state, listener) => res,
            _ = tokio::signal::ctrl_c() => Ok(()),
        }
    })
}
