use std::{thread, time::Duration};

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use statsd_client::{make_prefix, StatsClient as _, StatsdBuilder};

fn main() {
    tracing_subscriber::fmt::init();

    let client = StatsdBuilder::default()
        .with_remote_address("localhost:8125")
        .expect("failed to parse remote address")
        .with_prefix(make_prefix(&["example", "statsd_synchronous"]))
        .with_max_packet_length(1432)
        .build()
        .expect("failed to build StatsD client");

    let mut rng = Xoshiro256StarStar::from_rng(&mut rand::rng());

    // Loop over and over, pretending to do some work, and flushing every hundred iterations.
    for iteration in 0u64.. {
        client.increment("server_loops", 1, 1.0).expect("failed to send metric");
        client
            .time("server_loop_time", 0.1, || {
                thread::sleep(Duration::from_micros(rng.random_range(0..500)));
            })
            .expect("failed to send metric");

        if rng.random_bool(0.75) {
            client.increment_gauge("lucky_iterations", 1, 1.0).expect("failed to send metric");
        } else {
            client.decrement_gauge("lucky_iterations", 1, 1.0).expect("failed to send metric");
        }

        if iteration % 100 == 0 {
            client.flush().expect("failed to flush metrics");
        }
    }
}
