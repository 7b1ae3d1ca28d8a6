//! Bridges the state machine's `TraceSink` onto a real `tracing` subscriber,
//! via the `tracing-sink` feature's `ops::telemetry::tracing_sink::TracingSink`.
//!
//! Run with: `cargo run --example tracing_sink_demo --features tracing-sink`
use ops::retry::Deadline;
use ops::statemachine::{run, Named, Request, RunOptions};
use ops::telemetry::tracing_sink::TracingSink;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn step_one(mut req: Request<u32>) -> Request<u32> {
    req.data += 1;
    req.next = Some(Named::new("step-two", step_two));
    req
}

fn step_two(mut req: Request<u32>) -> Request<u32> {
    req.data += 10;
    req.next = None;
    req
}

fn main() {
    tracing_subscriber::fmt::init();

    let ctx = Deadline::new(CancellationToken::new());
    let start = Named::new("step-one", step_one);
    let request = Request::new(ctx, 0u32, start);
    let options = RunOptions::new().sink(Arc::new(TracingSink));

    let finished = run("tracing-demo", request, options);
    println!("final value: {}", finished.data);
}
