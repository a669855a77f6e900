// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
use std::env;
use std::time::Duration;

use sttp::{Callbacks, Config, Subscriber, SubscriptionInfo};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        eprintln!("usage: subscribe_and_print <host> <port>");
        std::process::exit(1);
    }
    let host = &args[1];
    let port: u16 = args[2].parse().expect("port must be a u16");

    let callbacks = Callbacks::builder()
        .new_measurements(|measurements| {
            for m in &measurements {
                println!("{} = {} @ {}", m.signal_id, m.value, m.timestamp);
            }
        })
        .subscription_updated(|cache| {
            println!("signal index cache updated: {} signals", cache.len());
        })
        .connection_terminated(|_| println!("connection terminated"))
        .error_message(|msg| eprintln!("error: {msg}"))
        .status_message(|msg| println!("status: {msg}"))
        .build();

    let subscriber = Subscriber::new(Config::default(), callbacks);
    subscriber.connect(host, port).expect("failed to connect");

    subscriber
        .subscribe(SubscriptionInfo {
            filter_expression: "FILTER ActiveMeasurements WHERE True".into(),
            ..Default::default()
        })
        .expect("failed to subscribe");

    println!("subscribed; printing measurements, press Ctrl+C to stop");
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
