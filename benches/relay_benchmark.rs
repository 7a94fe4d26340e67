use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use serde_json::value::RawValue;

use callrelay::signaling::{ClientMessage, Connection, Registry, ServerMessage, SessionId};

const OFFER: &str = r#"{"method":"NOTIFY","data":{"type":"offer","sdp":"v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n"}}"#;
const CANDIDATE: &str = r#"{"method":"NOTIFY","data":{"candidate":"candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx","sdpMid":"0","sdpMLineIndex":0}}"#;
const GET: &str = r#"{"method":"GET","msg_id":1,"resource":"/peerconnection"}"#;

/// parsing benchmark
fn bench_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Parsing");
    group.throughput(Throughput::Elements(1));

    for (name, text) in [("offer", OFFER), ("candidate", CANDIDATE), ("get", GET)] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let msg = ClientMessage::parse(black_box(text)).unwrap();
                black_box(msg)
            })
        });
    }

    group.finish();
}

/// relay encoding benchmark
fn bench_encode(c: &mut Criterion) {
    let data = RawValue::from_string(r#"{"candidate":"candidate:1 1 udp 1 10.0.0.1 4000 typ host"}"#.to_string())
        .unwrap();

    let mut group = c.benchmark_group("Encode");
    group.throughput(Throughput::Elements(1));

    group.bench_function("notify", |b| {
        b.iter(|| {
            let json = ServerMessage::notify(black_box(&data)).to_json().unwrap();
            black_box(json)
        })
    });

    group.finish();
}

/// queue a burst of candidates, then flush them to a joining peer
fn bench_queue_flush(c: &mut Criterion) {
    let id = SessionId::from("bench");
    let addr = "127.0.0.1:9000".parse().unwrap();
    let (sender, _sender_ends) = Connection::open(id.clone(), addr);

    let mut group = c.benchmark_group("QueueFlush");
    group.throughput(Throughput::Elements(16));

    group.bench_function("16_candidates", |b| {
        b.iter(|| {
            let mut registry = Registry::new();
            let session = registry.get_or_create(&id);
            for _ in 0..16 {
                if let ClientMessage::Notify { data } = ClientMessage::parse(CANDIDATE).unwrap() {
                    session.enqueue(sender.id(), data);
                }
            }
            black_box(session.drain_all())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_parsing, bench_encode, bench_queue_flush);
criterion_main!(benches);
