//! Routing example: a small order-processing chain that branches on the
//! payload, with cycle detection and a tracing sink enabled.
use ops::statemachine::{run, Named, Request, RunOptions};
use ops::telemetry::{FieldValue, NullSink, Span, StatusCode, TraceSink};
use ops::retry::Deadline;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Order {
    total_cents: i64,
    flagged_for_review: bool,
    receipt: Option<&'static str>,
}

fn validate(mut req: Request<Order>) -> Request<Order> {
    if req.data.total_cents <= 0 {
        req.err = Some("order total must be positive".into());
        return req;
    }
    req.next = Some(Named::new("check-fraud", check_fraud));
    req
}

fn check_fraud(mut req: Request<Order>) -> Request<Order> {
    if req.data.total_cents > 100_000 {
        req.data.flagged_for_review = true;
        req.next = Some(Named::new("manual-review", manual_review));
    } else {
        req.next = Some(Named::new("charge", charge));
    }
    req
}

fn manual_review(mut req: Request<Order>) -> Request<Order> {
    println!("order held for manual review: {} cents", req.data.total_cents);
    req.next = Some(Named::new("charge", charge));
    req
}

fn charge(mut req: Request<Order>) -> Request<Order> {
    req.data.receipt = Some("receipt-0001");
    req.next = None;
    req
}

fn main() {
    let order = Order { total_cents: 150_000, ..Default::default() };
    let start = Named::new("validate", validate);
    let ctx = Deadline::new(CancellationToken::new());
    let request = Request::new(ctx, order, start);

    let sink: Arc<dyn TraceSink> = Arc::new(PrintlnSink);
    let options = RunOptions::new().detect_cycles(true).sink(sink);

    let finished = run("process-order", request, options);
    match finished.err {
        Some(err) => println!("order processing failed: {err}"),
        None => println!(
            "order processed: flagged={}, receipt={:?}",
            finished.data.flagged_for_review, finished.data.receipt
        ),
    }

    // Without a sink installed the runner takes the zero-allocation path;
    // `NullSink` is what `RunOptions::new()` defaults to.
    let _ = NullSink;
}

/// A trivial `TraceSink` that prints span events, standing in for a real
/// OpenTelemetry/`tracing` bridge in this demo.
#[derive(Debug)]
struct PrintlnSink;

impl TraceSink for PrintlnSink {
    fn new_span(&self, name: &str) -> Box<dyn Span> {
        println!("[span start] {name}");
        Box::new(PrintlnSpan { name: name.to_string() })
    }
}

struct PrintlnSpan {
    name: String,
}

impl Span for PrintlnSpan {
    fn is_recording(&self) -> bool {
        true
    }

    fn event(&mut self, name: &str, fields: &[(&str, FieldValue)]) {
        println!("[{}] event {name}: {fields:?}", self.name);
    }

    fn status(&mut self, code: StatusCode, message: &str) {
        println!("[{}] status {code:?}: {message}", self.name);
    }

    fn end(&mut self) {
        println!("[span end] {}", self.name);
    }
}
