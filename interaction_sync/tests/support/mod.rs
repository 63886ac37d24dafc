// Shared primitives for one-time relay bootstrapping across integration tests.
#![allow(dead_code)]

use interaction_sync::domain::ports::{BodyConstraints, Interpolation, PhysicsBody};
use interaction_sync::domain::{Envelope, NetMessage, ObjectId, Pose, Vec3};
use interaction_sync::RelayClient;
use std::{
    // `Arc` shares data between threads; `OnceLock` writes a value only once.
    sync::{Arc, OnceLock},
    // Sleep durations are used in readiness polling loops.
    time::Duration,
};

// Global base URL used by all tests after the server publishes its bound address.
static SERVER_URL: OnceLock<String> = OnceLock::new();
// One-time guard that ensures the server bootstrap path runs only once.
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Ensure the test relay is running and return the shared base URL.
pub fn ensure_server() -> &'static str {
    // Run initialization exactly once even if multiple tests call this function.
    SERVER_READY.get_or_init(|| {
        // Local one-time slot where the server thread publishes its selected URL.
        let published_url = Arc::new(OnceLock::<String>::new());
        // Clone so the spawned thread can write into the same shared slot.
        let published_url_thread = Arc::clone(&published_url);
        // Spawn an OS thread so the server outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            // Each server thread owns its own Tokio runtime.
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            // Run async server startup and serving on this dedicated runtime.
            runtime.block_on(async move {
                // Bind to an ephemeral port to avoid collisions with local services.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                // Capture the exact address that was assigned by the OS.
                let addr = listener.local_addr().expect("get local addr");
                // Publish the final base URL so test code can target the right server.
                let _ = published_url_thread.set(format!("http://{}", addr));
                // Serve the relay until the test process exits.
                interaction_sync::run(listener).await.expect("server failed");
            });
        });
        // Block until URL is published and the bound port starts accepting connections.
        wait_for_server_url_and_readiness(published_url);
    });

    // Return the stable shared URL used by all tests in this binary.
    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

// Wait for URL publication and then wait for the server socket to accept TCP connections.
fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    // Poll until the server thread publishes the base URL.
    let base_url = loop {
        // If the URL is published, clone it and stop waiting.
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        // Avoid a tight loop while waiting for the background thread.
        std::thread::sleep(Duration::from_millis(10));
    };

    // Persist the URL globally so every test gets the same endpoint.
    let _ = SERVER_URL.set(base_url.clone());

    // Strip the scheme so we can use host:port for raw TCP readiness checks.
    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        // Successful connect means the server socket is accepting connections.
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        // Wait briefly before the next readiness probe.
        std::thread::sleep(Duration::from_millis(20));
    }

    // Fail fast if startup never reached an accepting state.
    panic!("server did not become ready in time");
}

// WebSocket endpoint of the shared relay.
pub fn ws_url() -> String {
    let base_url = ensure_server();
    format!("{}/ws", base_url.replacen("http://", "ws://", 1))
}

// Spawn an object through the HTTP endpoint and return its id.
pub async fn spawn_object(kind: &str, spawn_locked: bool) -> ObjectId {
    let base_url = ensure_server();
    let res = reqwest::Client::new()
        .post(format!("{base_url}/objects"))
        .json(&serde_json::json!({ "kind": kind, "spawn_locked": spawn_locked }))
        .send()
        .await
        .expect("spawn request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.expect("spawn response json");
    body["object_id"].as_u64().expect("object_id in response")
}

// Wait for the next envelope about `object_id` that satisfies `pred`, skipping
// traffic for objects other tests created on the shared relay.
pub async fn next_matching(
    client: &mut RelayClient,
    object_id: ObjectId,
    pred: impl Fn(&NetMessage) -> bool,
) -> Envelope {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let envelope = client.recv().await.expect("relay connection open");
            if envelope.object_id == object_id && pred(&envelope.message) {
                return envelope;
            }
        }
    })
    .await
    .expect("expected envelope in time")
}

pub fn still_body(_object_id: ObjectId, _kind: &str) -> Option<Box<dyn PhysicsBody>> {
    Some(Box::new(StillBody::default()))
}

// Body that stays where it was put; enough for ownership traffic.
#[derive(Default)]
pub struct StillBody {
    pose: Pose,
    scale: Vec3,
    velocity: Vec3,
    angular_velocity: Vec3,
    kinematic: bool,
    interpolation: Interpolation,
}

impl PhysicsBody for StillBody {
    fn position(&self) -> Vec3 {
        self.pose.position
    }
    fn pose(&self) -> Pose {
        self.pose
    }
    fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }
    fn scale(&self) -> Vec3 {
        self.scale
    }
    fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }
    fn velocity(&self) -> Vec3 {
        self.velocity
    }
    fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }
    fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }
    fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
    }
    fn is_kinematic(&self) -> bool {
        self.kinematic
    }
    fn set_kinematic(&mut self, kinematic: bool) {
        self.kinematic = kinematic;
    }
    fn interpolation(&self) -> Interpolation {
        self.interpolation
    }
    fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }
    fn set_constraints(&mut self, _constraints: BodyConstraints) {}
}
