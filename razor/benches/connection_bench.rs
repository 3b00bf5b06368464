use criterion::{black_box, criterion_group, criterion_main, Criterion};
use razor::logging;
use razor::Connection;

fn loopback_send_receive(c: &mut Criterion) {
    let mut a = Connection::open(41223, None, false, logging::discard()).unwrap();
    let mut b = Connection::open(41224, None, false, logging::discard()).unwrap();

    c.bench_function("connection_small_message_loopback", |b_| {
        b_.iter(|| {
            b.send("127.0.0.1:41223", black_box(b"Hello world")).unwrap();
            loop {
                if a.receive().unwrap().is_some() {
                    break;
                }
            }
        })
    });
}

fn multipart_send_receive(c: &mut Criterion) {
    let mut a = Connection::open(41225, None, false, logging::discard()).unwrap();
    let mut b = Connection::open(41226, None, false, logging::discard()).unwrap();
    let blob = vec![9u8; 900];

    c.bench_function("connection_multipart_loopback", |b_| {
        b_.iter(|| {
            b.send("127.0.0.1:41225", black_box(&blob)).unwrap();
            loop {
                if a.receive().unwrap().is_some() {
                    break;
                }
            }
        })
    });
}

criterion_group!(benches, loopback_send_receive, multipart_send_receive);
criterion_main!(benches);
