// SPDX-FileCopyrightText: 2026 The sttp-rs Authors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
use std::env;
use std::time::Duration;

use sttp::{Callbacks, Config, Subscriber, SubscriptionInfo, UdpDataChannel};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        eprintln!("usage: udp_subscribe <host> <port> <local-udp-port>");
        std::process::exit(1);
    }
    let host = &args[1];
    let port: u16 = args[2].parse().expect("port must be a u16");
    let local_udp_port: u16 = args[3].parse().expect("local-udp-port must be a u16");

    let callbacks = Callbacks::builder()
        .new_measurements(|measurements| println!("received {} measurements", measurements.len()))
        .error_message(|msg| eprintln!("error: {msg}"))
        .build();

    let subscriber = Subscriber::new(Config::default(), callbacks);
    subscriber.connect(host, port).expect("failed to connect");

    subscriber
        .subscribe(SubscriptionInfo {
            filter_expression: "FILTER ActiveMeasurements WHERE True".into(),
            udp_data_channel: UdpDataChannel {
                enabled: true,
                local_port: local_udp_port,
                interface: String::new(),
            },
            ..Default::default()
        })
        .expect("failed to subscribe");

    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
