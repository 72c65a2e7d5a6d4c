//! Calculator service: one method for each call shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use streamrpc::prelude::*;

use crate::AppState;

/// Pause between two streamed prime factors.
const FACTOR_INTERVAL: Duration = Duration::from_secs(1);

const DIVISORS_PER_YIELD: i64 = 4096;

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SumRequest {
    #[prost(int32, tag = "1")]
    pub first_number: i32,
    #[prost(int32, tag = "2")]
    pub second_number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SumResponse {
    #[prost(int32, tag = "1")]
    pub sum_result: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrimeNumberDecompositionRequest {
    #[prost(int64, tag = "1")]
    pub number: i64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrimeNumberDecompositionResponse {
    #[prost(int64, tag = "1")]
    pub prime_factor: i64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComputeAverageRequest {
    #[prost(int32, tag = "1")]
    pub number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComputeAverageResponse {
    #[prost(double, tag = "1")]
    pub average: f64,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindMaximumRequest {
    #[prost(int32, tag = "1")]
    pub number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FindMaximumResponse {
    #[prost(int32, tag = "1")]
    pub max_number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SquareRootRequest {
    #[prost(int32, tag = "1")]
    pub number: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SquareRootResponse {
    #[prost(double, tag = "1")]
    pub number_root: f64,
}

pub fn register(registry: &mut Registry<AppState>) -> Result<(), Status> {
    registry.register_unary("calculator.CalculatorService/Sum", sum)?;
    registry.register_server_stream(
        "calculator.CalculatorService/PrimeNumberDecomposition",
        prime_number_decomposition,
    )?;
    registry.register_client_stream(
        "calculator.CalculatorService/ComputeAverage",
        compute_average,
    )?;
    registry.register_bidi_stream("calculator.CalculatorService/FindMaximum", find_maximum)?;
    registry.register_unary("calculator.CalculatorService/SquareRoot", square_root)?;
    Ok(())
}

async fn sum(_: AppState, req: SumRequest, _: CallContext) -> Result<SumResponse, RpcError> {
    let sum_result = req
        .first_number
        .checked_add(req.second_number)
        .ok_or_else(|| RpcError::invalid_argument("sum overflows a 32-bit integer"))?;
    Ok(SumResponse { sum_result })
}

/// Stream the prime factors of `number` in ascending order, one per
/// [`FACTOR_INTERVAL`]. Numbers below 2 have no factors.
///
/// Trial division yields to the runtime every [`DIVISORS_PER_YIELD`]
/// candidates and stops once the call is cancelled.
async fn prime_number_decomposition(
    _: AppState,
    req: PrimeNumberDecompositionRequest,
    ctx: CallContext,
    mut out: MessageSender<PrimeNumberDecompositionResponse>,
) -> Result<(), RpcError> {
    let mut number = req.number;
    let mut divisor: i64 = 2;
    let mut emitted = false;
    while number > 1 {
        let factor = if divisor > number / divisor {
            // No divisor up to the square root: the remainder is prime.
            number
        } else if number % divisor == 0 {
            divisor
        } else {
            divisor += 1;
            if divisor % DIVISORS_PER_YIELD == 0 {
                ctx.check()?;
                tokio::task::yield_now().await;
            }
            continue;
        };

        if emitted {
            tokio::time::sleep(FACTOR_INTERVAL).await;
        }
        out.push(PrimeNumberDecompositionResponse {
            prime_factor: factor,
        })?;
        emitted = true;
        number /= factor;
    }
    Ok(())
}

async fn compute_average(
    _: AppState,
    mut input: MessageReceiver<ComputeAverageRequest>,
    _: CallContext,
) -> Result<ComputeAverageResponse, RpcError> {
    let mut sum = 0i64;
    let mut count = 0u32;
    while let Some(req) = input.next().await? {
        sum += i64::from(req.number);
        count += 1;
    }
    if count == 0 {
        return Err(RpcError::invalid_argument(
            "cannot average an empty stream of numbers",
        ));
    }
    Ok(ComputeAverageResponse {
        average: sum as f64 / f64::from(count),
    })
}

/// Emit the running maximum each time an input is strictly greater than
/// every input before it.
async fn find_maximum(
    _: AppState,
    mut input: MessageReceiver<FindMaximumRequest>,
    mut out: MessageSender<FindMaximumResponse>,
    _: CallContext,
) -> Result<(), RpcError> {
    let mut max: Option<i32> = None;
    while let Some(req) = input.next().await? {
        if max.is_none_or(|max| req.number > max) {
            max = Some(req.number);
            out.push(FindMaximumResponse {
                max_number: req.number,
            })?;
        }
    }
    out.close(Status::ok())?;
    Ok(())
}

async fn square_root(
    _: AppState,
    req: SquareRootRequest,
    _: CallContext,
) -> Result<SquareRootResponse, RpcError> {
    if req.number < 0 {
        return Err(RpcError::invalid_argument(format!(
            "received a negative number: {}",
            req.number
        )));
    }
    Ok(SquareRootResponse {
        number_root: f64::from(req.number).sqrt(),
    })
}
