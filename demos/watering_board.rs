use std::sync::Arc;
use std::time::Duration;

use log::info;
use rand::Rng;

use coap_connector::app::{self, AccessMask, DynamicResource, RegistrationFlag, StaticResource};
use coap_connector::{ConnectorServer, UdpTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = app::new()
        .endpoint_name("watering-board-01")
        .endpoint_type("watering-board")
        .static_resource(StaticResource::new("dev/mfg", "acme"))
        .static_resource(StaticResource::new("dev/mdl", "wb-1"))
        .resource(
            // Try `coap-client -s 60 -m get -O 6,0x00 coap://localhost/sensors/moisture`.
            app::resource("sensors/moisture", "Moisture", MoistureSensor::default())
                .observable(true)
                .cadence(Duration::from_secs(10)),
        )
        .resource(
            app::resource("actuators/relay", "Relay", Relay::default())
                .mask(AccessMask::GET | AccessMask::PUT),
        )
        .resource(
            app::resource("actuators/led", "Led", Led::default())
                .mask(AccessMask::GET | AccessMask::PUT | AccessMask::POST),
        )
        .build()?;

    // Directory registration is handled elsewhere; this board pretends it already succeeded.
    let registration = Arc::new(RegistrationFlag::new(true));

    let server = ConnectorServer::bind(UdpTransport::new("0.0.0.0:5683")).await?;
    server.serve(options, registration).await?;
    Ok(())
}

/// Simulated soil moisture probe, reporting a percentage that drifts over time.
struct MoistureSensor {
    level: f32,
}

impl Default for MoistureSensor {
    fn default() -> Self {
        Self { level: 40.0 }
    }
}

impl DynamicResource for MoistureSensor {
    fn get(&mut self) -> String {
        self.level = (self.level + rand::thread_rng().gen_range(-2.0..2.0)).clamp(0.0, 100.0);
        format!("{:.1}", self.level)
    }
}

/// Pump relay; accepts "0" (off) and "1" (on).  Anything else is ignored.
#[derive(Default)]
struct Relay {
    on: bool,
}

impl DynamicResource for Relay {
    fn get(&mut self) -> String {
        if self.on { "1" } else { "0" }.to_string()
    }

    fn put(&mut self, value: String) {
        match value.trim() {
            "0" => self.on = false,
            "1" => self.on = true,
            other => info!("Ignoring relay value {other:?}"),
        }
        info!("Relay is {}", if self.on { "on" } else { "off" });
    }
}

/// Status LED colour.  PUT sets it, POST with any value turns it off.
struct Led {
    colour: String,
}

impl Default for Led {
    fn default() -> Self {
        Self {
            colour: "off".to_string(),
        }
    }
}

impl DynamicResource for Led {
    fn get(&mut self) -> String {
        self.colour.clone()
    }

    fn put(&mut self, value: String) {
        self.colour = value.trim().to_lowercase();
    }

    fn post(&mut self, _value: String) {
        self.colour = "off".to_string();
    }
}
