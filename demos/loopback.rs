//! Loopback demo - a meter and a radio talking over an in-memory link.
//!
//! This example demonstrates:
//! - Building both ends of a link from a `LinkConfig`
//! - Answering get/set/time/echo requests on the meter side
//! - Running every request type from the radio side
//!
//! # Running
//!
//! ```text
//! RUST_LOG=b2b_link=debug cargo run --example loopback
//! cargo run --example loopback -- link.json
//! ```
//!
//! The optional argument is a JSON file with `LinkConfig` fields.

use std::sync::{Arc, Mutex};

use b2b_link::codec::ParamRequest;
use b2b_link::{ClientBuilder, GetStatus, LinkConfig, SetStatus, TimeSet};
use bytes::Bytes;
use tracing_subscriber::EnvFilter;

/// Reading type the meter exposes.
const VOLTAGE: u16 = 0x0101;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => LinkConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => LinkConfig::default(),
    };

    let voltage = Arc::new(Mutex::new(240u16));
    let get_voltage = Arc::clone(&voltage);
    let set_voltage = Arc::clone(&voltage);

    let (meter_port, radio_port) = tokio::io::duplex(4096);

    let _meter = ClientBuilder::from_config(config.clone())
        .answer_echo()
        .on_get(move |req: ParamRequest, ctx| {
            let voltage = Arc::clone(&get_voltage);
            async move {
                if req.reading_type != VOLTAGE {
                    return ctx
                        .respond_get(GetStatus::NotSupported, req.reading_type, &[])
                        .await;
                }
                let value = voltage.lock().map(|v| *v).unwrap_or_default();
                ctx.respond_get(GetStatus::Success, VOLTAGE, &value.to_be_bytes())
                    .await
            }
        })
        .on_set(move |req: ParamRequest, ctx| {
            let voltage = Arc::clone(&set_voltage);
            async move {
                let Ok(bytes) = <[u8; 2]>::try_from(&req.value[..]) else {
                    return ctx
                        .respond_set(SetStatus::Invalid, req.reading_type, &[])
                        .await;
                };
                if let Ok(mut v) = voltage.lock() {
                    *v = u16::from_be_bytes(bytes);
                }
                ctx.respond_set(SetStatus::Success, req.reading_type, &bytes)
                    .await
            }
        })
        .on_time_request(|_: (), ctx| async move { ctx.respond_time(&TimeSet::now()).await })
        .on_gateway_traffic(|data: Bytes, _ctx| async move {
            println!("meter: gateway traffic of {} bytes", data.len());
            Ok(())
        })
        .start_stream(meter_port);

    let radio = ClientBuilder::from_config(config).start_stream(radio_port);
    let messenger = radio.messenger();

    println!("radio: echo -> {}", messenger.echo().await);

    let mut value = [0u8; 8];
    let reply = messenger.get_parameter(VOLTAGE, &mut value).await;
    println!("radio: get voltage -> {:?} {:?}", reply.status, &value[..reply.len]);

    let mut new_value = 230u16.to_be_bytes();
    let reply = messenger.set_parameter(VOLTAGE, &mut new_value).await;
    println!("radio: set voltage -> {:?} {:?}", reply.status, new_value);

    let reply = messenger.get_parameter(0x0999, &mut value).await;
    println!("radio: get unknown reading -> {:?}", reply.status);

    match messenger.request_time().await {
        Some(time) => println!("radio: meter time {}.{:010}", time.seconds, time.q_frac),
        None => println!("radio: no time response"),
    }

    messenger.send_time_sync(&TimeSet::now()).await?;
    messenger.send_gateway_traffic(b"hello network").await?;

    // Let the meter's handlers finish before exiting.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    Ok(())
}
