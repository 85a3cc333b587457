//! Reference host process: one `hello` action and a `welcome` page, wired
//! up against the WebSocket connector with CLI-provided credentials.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use hostbridge::prelude::*;
use hostbridge::{ComponentDescriptor as Component, Group, HandlerError, RouteAccess, RouteRegistry};
use serde_json::{Value, json};

/// Demo host process for a hostbridge deployment.
#[derive(Parser, Debug)]
#[command(name = "hostbridge-demo", version, about = "Run a demo hostbridge host")]
struct Cli {
    /// WebSocket endpoint of the service to connect to.
    #[arg(long, env = "HOSTBRIDGE_ENDPOINT")]
    endpoint: Option<String>,
    /// API key presented as the `x-api-key` upgrade header.
    #[arg(long, env = "HOSTBRIDGE_API_KEY")]
    api_key: Option<String>,
}

struct Hello;

#[async_trait]
impl ActionHandler<WebSocketDuplexStream> for Hello {
    async fn invoke(&self, ctx: Arc<ActionContext<WebSocketDuplexStream>>) -> Result<Value, HandlerError> {
        let name = ctx.params.get("name").and_then(Value::as_str).unwrap_or("world");
        ctx.log(format!("greeting {name}")).await;

        let result = ctx
            .io()
            .render(Group::single(Component::new("input.text", "Your name", json!({ "default": name }))))
            .await
            .map_err(HandlerError::from)?;

        Ok(json!({ "greeted": result.values.first().cloned().unwrap_or(Value::Null) }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = host_config_from_env()?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint;
    }
    if let Some(api_key) = cli.api_key {
        config.api_key = Some(api_key);
    }

    init_tracing(config.log_level);

    let connector = Arc::new(WebSocketConnector::new(&config));
    let routes: Arc<RouteRegistry<WebSocketDuplexStream>> = Arc::new(RouteRegistry::new());
    routes.register(vec![RouteNode::Action {
        slug: "hello".to_string(),
        handler: Arc::new(Hello),
        metadata: None,
        access: RouteAccess::Public,
    }]);

    let registry = Arc::new(PermissiveRegistry::new());
    let controller = HostController::new(config, connector, routes, registry);
    let handle = controller.connect().await?;

    tracing::info!("connected, awaiting ctrl-c");
    tokio::signal::ctrl_c().await?;
    handle.begin_shutdown().await?;
    Ok(())
}
