//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP, bound to localhost.

use crate::handler::RpcHandler;
use crate::types::{
    ConcurrencyRequest, EnqueueRequest, ExecutionRequest, StatsRequest, TailLogsRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9627;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

/// Register one `method` that parses its params into `$req` and calls `$call`
macro_rules! register {
    ($module:expr, $handler:expr, $method:literal, $req:ty, $call:ident) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: $req = params.parse()?;
                    handler.$call(req).await
                }
            })
            .map_err(|e| e.to_string())?;
    }};
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: RpcHandler) -> Self {
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Build the method table
    pub fn module(&self) -> Result<RpcModule<()>, String> {
        let mut module = RpcModule::new(());
        register!(module, self.handler, "executions.enqueue.v1", EnqueueRequest, enqueue);
        register!(module, self.handler, "executions.get.v1", ExecutionRequest, get);
        register!(module, self.handler, "executions.cancel.v1", ExecutionRequest, cancel);
        register!(module, self.handler, "logs.tail.v1", TailLogsRequest, tail_logs);

        // No params at all is the common call
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: Option<StatsRequest> = params.parse()?;
                    handler.stats(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| e.to_string())?;
        register!(
            module,
            self.handler,
            "admin.concurrency.v1",
            ConcurrencyRequest,
            set_concurrency
        );
        Ok(module)
    }

    /// Start serving; the returned handle stops the server
    pub async fn start(self) -> Result<ServerHandle, String> {
        if !is_loopback(&self.config.host) {
            warn!(host = %self.config.host, "RPC host is not a loopback address");
        }
        let addr = format!("{}:{}", self.config.host, self.config.port);
        info!(host = %self.config.host, port = self.config.port, "Starting JSON-RPC server");

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let module = self.module()?;

        info!("JSON-RPC server started successfully");
        Ok(server.start(module))
    }
}

fn is_loopback(host: &str) -> bool {
    host == "localhost"
        || host
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}
