//! Fan-out example: 50 producers each send a value with `Promise` delivery,
//! 100 consumers race to receive and double it, and a collector gathers
//! every promised reply.
use ops::retry::Deadline;
use ops::signal::{DeliveryMode, Signaller, SignallerOptions};
use std::collections::BTreeSet;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let signaller: Signaller<u32, u32> = Signaller::new(SignallerOptions::new().buffer(16));

    for _ in 0..100 {
        let consumer = signaller.clone();
        tokio::spawn(async move {
            let mut stream = consumer.receive();
            if let Some(acker) = stream.next().await {
                let doubled = acker.data * 2;
                acker.ack(doubled);
            }
        });
    }

    let (collector_tx, mut collector_rx) = mpsc::channel(64);
    for i in 0..50u32 {
        let signaller = signaller.clone();
        let collector_tx = collector_tx.clone();
        let ctx = Deadline::new(CancellationToken::new());
        signaller.signal(&ctx, i, DeliveryMode::Promise(collector_tx)).await.unwrap();
    }
    drop(collector_tx);

    let mut got = BTreeSet::new();
    while let Some(value) = collector_rx.recv().await {
        got.insert(value);
    }

    signaller.close();
    println!("received {} doubled values: {:?}", got.len(), got);
    assert_eq!(got, (0..50u32).map(|i| i * 2).collect());
}
