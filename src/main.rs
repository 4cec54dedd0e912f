//! `oauth2-gateway` binary: loads the environment configuration and serves the gateway.

// std
use std::net::{Ipv4Addr, SocketAddr};
// crates.io
use color_eyre::eyre::{Result, WrapErr};
use oauth2_gateway::{config::GatewayConfig, obs, server::Gateway};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	obs::init_tracing();

	let config = GatewayConfig::from_env().wrap_err("failed to load gateway configuration")?;
	let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
	let gateway = Gateway::new(config).wrap_err("failed to assemble the gateway")?;
	let listener = TcpListener::bind(addr).await.wrap_err_with(|| format!("failed to bind {addr}"))?;

	gateway.serve(listener, shutdown_signal()).await?;

	tracing::info!("gateway stopped");

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "failed to listen for the shutdown signal");

		std::future::pending::<()>().await;
	}
}
