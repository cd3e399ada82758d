// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{Criterion, criterion_group, criterion_main};
use tasklet::{Channel, Error, Preference, Scheduler};

const PINGS: usize = 10_000;

fn ping_ping_10k(c: &mut Criterion) {
    c.bench_function("ping_ping_10k", |b| {
        b.iter(|| {
            let scheduler = Scheduler::new();
            scheduler.spawn(|t| async move {
                for _ in 0..PINGS {
                    t.schedule().await?;
                }
                Ok::<_, Error>(())
            });
            scheduler.run().unwrap();
        });
    });
}

fn round_robin_10k(c: &mut Criterion) {
    c.bench_function("round_robin_10k", |b| {
        b.iter(|| {
            let scheduler = Scheduler::new();
            for _ in 0..2 {
                scheduler.spawn(|t| async move {
                    for _ in 0..PINGS {
                        t.schedule().await?;
                    }
                    Ok::<_, Error>(())
                });
            }
            scheduler.run().unwrap();
        });
    });
}

fn ping_pong_10k(c: &mut Criterion) {
    for preference in [Preference::Neither, Preference::Receiver, Preference::Sender] {
        c.bench_function(&format!("ping_pong_10k_{preference:?}"), |b| {
            b.iter(|| {
                let scheduler = Scheduler::new();
                let chan = Channel::new();
                chan.set_preference(preference);

                let rx = chan.clone();
                scheduler.spawn(move |t| async move {
                    for _ in 0..PINGS {
                        rx.receive(&t).await?;
                    }
                    Ok::<_, Error>(())
                });
                scheduler.spawn(move |t| async move {
                    for i in 0..PINGS {
                        chan.send(&t, i).await?;
                    }
                    Ok::<_, Error>(())
                });

                scheduler.run().unwrap();
                assert!(scheduler.take_failures().is_empty());
            });
        });
    }
}

criterion_group!(ping_pong, ping_ping_10k, round_robin_10k, ping_pong_10k);
criterion_main!(ping_pong);
