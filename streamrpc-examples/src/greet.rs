//! Greet service.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamrpc::prelude::*;

use crate::AppState;

const GREETING_COUNT: usize = 10;
const GREETING_INTERVAL: Duration = Duration::from_secs(1);

/// Simulated work done by `GreetWithDeadline`, checked for cancellation
/// after every step.
const DEADLINE_WORK_STEPS: usize = 3;
const DEADLINE_WORK_STEP: Duration = Duration::from_secs(1);

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Greeting {
    #[prost(string, tag = "1")]
    pub first_name: String,
    #[prost(string, tag = "2")]
    pub last_name: String,
}

/// Request carrying a single [`Greeting`]; shared by every greet method.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetRequest {
    #[prost(message, optional, tag = "1")]
    pub greeting: Option<Greeting>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetResponse {
    #[prost(string, tag = "1")]
    pub result: String,
}

impl GreetRequest {
    pub fn new(first_name: impl Into<String>) -> Self {
        Self {
            greeting: Some(Greeting {
                first_name: first_name.into(),
                last_name: String::new(),
            }),
        }
    }

    fn first_name(&self) -> &str {
        self.greeting
            .as_ref()
            .map(|g| g.first_name.as_str())
            .unwrap_or_default()
    }
}

fn reply(result: String) -> GreetResponse {
    GreetResponse { result }
}

pub fn register(registry: &mut Registry<AppState>) -> Result<(), Status> {
    registry.register_unary("greet.GreetService/Greet", greet)?;
    registry.register_server_stream("greet.GreetService/GreetManyTimes", greet_many_times)?;
    registry.register_client_stream("greet.GreetService/LongGreet", long_greet)?;
    registry.register_bidi_stream("greet.GreetService/GreetEveryone", greet_everyone)?;
    registry.register_unary("greet.GreetService/GreetWithDeadline", greet_with_deadline)?;
    Ok(())
}

async fn greet(_: AppState, req: GreetRequest, _: CallContext) -> Result<GreetResponse, RpcError> {
    Ok(reply(format!("Hello {}", req.first_name())))
}

async fn greet_many_times(
    _: AppState,
    req: GreetRequest,
    _: CallContext,
    mut out: MessageSender<GreetResponse>,
) -> Result<(), RpcError> {
    for i in 0..GREETING_COUNT {
        if i > 0 {
            tokio::time::sleep(GREETING_INTERVAL).await;
        }
        out.push(reply(format!("Hello {} number {i}", req.first_name())))?;
    }
    Ok(())
}

async fn long_greet(
    _: AppState,
    mut input: MessageReceiver<GreetRequest>,
    _: CallContext,
) -> Result<GreetResponse, RpcError> {
    let mut result = String::new();
    while let Some(req) = input.next().await? {
        result.push_str(&format!("Hello {}! ", req.first_name()));
    }
    Ok(reply(result))
}

async fn greet_everyone(
    _: AppState,
    mut input: MessageReceiver<GreetRequest>,
    mut out: MessageSender<GreetResponse>,
    _: CallContext,
) -> Result<(), RpcError> {
    while let Some(req) = input.next().await? {
        out.push(reply(format!("Hello {}! ", req.first_name())))?;
    }
    Ok(())
}

async fn greet_with_deadline(
    _: AppState,
    req: GreetRequest,
    ctx: CallContext,
) -> Result<GreetResponse, RpcError> {
    for step in 0..DEADLINE_WORK_STEPS {
        tokio::time::sleep(DEADLINE_WORK_STEP).await;
        if let Err(e) = ctx.check() {
            tracing::debug!(step, "caller gave up on greeting");
            return Err(e.into());
        }
    }
    Ok(reply(format!("Hello {}", req.first_name())))
}
