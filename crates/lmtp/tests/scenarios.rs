//! End-to-end engine scenarios (spec.md §8 "Testable Properties" S1-S6):
//! drive `Dispatcher::run` over an in-memory duplex socket against the
//! reference `MemoryStore`/`MemoryDirectory`/`InProcessAnvil` collaborators,
//! scripting exactly the command sequences and reply codes the properties
//! name.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use anvil::InProcessAnvil;
use directory::memory::MemoryDirectory;
use lmtp::delivery::proxy::UnavailableProxyClient;
use lmtp::router::Router;
use lmtp::session::{dispatcher::Dispatcher, SessionState};
use lmtp::transport::LineTransport;
use lmtp::LmtpConfig;
use store::memory::MemoryStore;

struct Harness {
    client: BufReader<DuplexStream>,
}

impl Harness {
    async fn send(&mut self, line: &str) {
        self.client.get_mut().write_all(line.as_bytes()).await.unwrap();
        self.client.get_mut().write_all(b"\r\n").await.unwrap();
    }

    async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        self.client.read_line(&mut line).await.unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    /// Read one reply, following `render_multiline`'s `CODE-`/`CODE ` rule
    /// until a non-continuation line ends it.
    async fn recv_reply(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let line = self.recv_line().await;
            let continues = line.as_bytes().get(3) == Some(&b'-');
            lines.push(line);
            if !continues {
                break;
            }
        }
        lines
    }
}

struct Setup {
    router: Router,
    store: Arc<dyn store::MailStore>,
    trusted: bool,
    proxy_ttl: u32,
    max_inmemory_size: usize,
}

impl Default for Setup {
    fn default() -> Self {
        Setup {
            router: Router {
                directory: Arc::new(MemoryDirectory::new()),
                store: Arc::new(MemoryStore::new(std::env::temp_dir())),
                anvil: Arc::new(InProcessAnvil::new(0)),
                service_name: "lmtp".to_string(),
                my_hostname: "mx.example.com".to_string(),
                recipient_delimiter: Some('+'),
                proxying_enabled: true,
                max_concurrent_per_user: 0,
            },
            store: Arc::new(MemoryStore::new(std::env::temp_dir())),
            trusted: false,
            proxy_ttl: 5,
            max_inmemory_size: lmtp::config::DEFAULT_MAX_INMEMORY_SIZE,
        }
    }
}

fn spawn(setup: Setup) -> Harness {
    let (client, server) = tokio::io::duplex(256 * 1024);
    let dispatcher = Arc::new(Dispatcher {
        router: setup.router,
        store: setup.store,
        proxy_client: Arc::new(UnavailableProxyClient),
        tls_acceptor: None,
        config: LmtpConfig {
            greeting_domain: "mx.example.com".to_string(),
            max_inmemory_size: setup.max_inmemory_size,
            ..LmtpConfig::default()
        },
    });
    let state = SessionState::new(
        "abc123".to_string(),
        "10.0.0.9".parse().unwrap(),
        5555,
        "10.0.0.1".parse().unwrap(),
        24,
        setup.trusted,
        setup.proxy_ttl,
    );
    tokio::spawn(async move {
        let transport = LineTransport::new(Box::new(server));
        dispatcher.run(transport, state).await;
    });
    Harness {
        client: BufReader::new(client),
    }
}

/// S1: minimal local delivery.
#[tokio::test]
async fn s1_minimal_local_delivery() {
    let store = MemoryStore::new(std::env::temp_dir());
    store.add_user("u", 1000, 1000);
    let store: Arc<dyn store::MailStore> = Arc::new(store);

    let mut setup = Setup::default();
    setup.router.store = store.clone();
    setup.store = store;

    let mut harness = spawn(setup);

    assert_eq!(harness.recv_line().await, "220 mx.example.com LMTP ready");

    harness.send("LHLO client.example.org").await;
    let lhlo = harness.recv_reply().await;
    assert_eq!(lhlo.last().unwrap(), "250 PIPELINING");
    assert!(lhlo.iter().any(|l| l == "250-mx.example.com"));

    harness.send("MAIL FROM:<s@x>").await;
    assert_eq!(harness.recv_line().await, "250 2.1.0 OK");

    harness.send("RCPT TO:<u@local>").await;
    assert_eq!(harness.recv_line().await, "250 2.1.5 OK");

    harness.send("DATA").await;
    assert_eq!(harness.recv_line().await, "354 OK");
    harness.send("Subject: hi").await;
    harness.send("").await;
    harness.send("Hello there").await;
    harness.send(".").await;
    assert_eq!(harness.recv_line().await, "250 2.0.0 <u@local> delivered");

    harness.send("QUIT").await;
    assert_eq!(harness.recv_line().await, "221 2.0.0 OK");
}

/// S2: a local recipient after a proxy recipient is refused, not queued.
#[tokio::test]
async fn s2_mixed_destinations_refused() {
    let directory = MemoryDirectory::new();
    directory.add_proxy_user("remote_user", "mx2.example.com", 24);
    let store = MemoryStore::new(std::env::temp_dir());
    store.add_user("alice", 1000, 1000);
    let store: Arc<dyn store::MailStore> = Arc::new(store);

    let mut setup = Setup::default();
    setup.router.directory = Arc::new(directory);
    setup.router.store = store.clone();
    setup.store = store;

    let mut harness = spawn(setup);
    harness.recv_line().await; // greeting

    harness.send("LHLO a").await;
    harness.recv_reply().await;

    harness.send("MAIL FROM:<s@x>").await;
    harness.recv_line().await;

    harness.send("RCPT TO:<remote_user@remote>").await;
    assert_eq!(harness.recv_line().await, "250 2.1.5 OK");

    harness.send("RCPT TO:<alice@local>").await;
    assert_eq!(
        harness.recv_line().await,
        "451 4.3.0 <alice@local> Can't handle mixed proxy/non-proxy destinations"
    );
}

/// S3: a passdb record that proxies back to this very listener is a loop.
#[tokio::test]
async fn s3_loop_detection() {
    let directory = MemoryDirectory::new();
    directory.add_proxy_user("bob", "mx.example.com", 24);

    let mut setup = Setup::default();
    setup.router.directory = Arc::new(directory);

    let mut harness = spawn(setup);
    harness.recv_line().await;

    harness.send("LHLO a").await;
    harness.recv_reply().await;
    harness.send("MAIL FROM:<s@x>").await;
    harness.recv_line().await;

    harness.send("RCPT TO:<bob@remote>").await;
    assert_eq!(
        harness.recv_line().await,
        "554 5.4.6 <bob@remote> Proxying loops to itself"
    );
}

/// S4: a session that starts with `proxy_ttl=1` refuses the first proxy hop.
#[tokio::test]
async fn s4_ttl_exhaustion() {
    let directory = MemoryDirectory::new();
    directory.add_proxy_user("carl", "mx2.example.com", 24);

    let mut setup = Setup::default();
    setup.router.directory = Arc::new(directory);
    setup.proxy_ttl = 1;

    let mut harness = spawn(setup);
    harness.recv_line().await;

    harness.send("LHLO a").await;
    harness.recv_reply().await;
    harness.send("MAIL FROM:<s@x>").await;
    harness.recv_line().await;

    harness.send("RCPT TO:<carl@remote>").await;
    assert_eq!(
        harness.recv_line().await,
        "554 5.4.6 <carl@remote> Proxying appears to be looping (TTL=0)"
    );
}

/// S5: a body larger than the in-memory ceiling spills to a temp file but
/// still delivers the full composed message.
#[tokio::test]
async fn s5_spilled_body_still_delivers() {
    let concrete = Arc::new(MemoryStore::new(std::env::temp_dir()));
    concrete.add_user("u", 1000, 1000);
    let store: Arc<dyn store::MailStore> = concrete.clone();

    let mut setup = Setup::default();
    setup.router.store = store.clone();
    setup.store = store;
    setup.max_inmemory_size = 16;

    let mut harness = spawn(setup);
    harness.recv_line().await;

    harness.send("LHLO a").await;
    harness.recv_reply().await;
    harness.send("MAIL FROM:<s@x>").await;
    harness.recv_line().await;
    harness.send("RCPT TO:<u@local>").await;
    harness.recv_line().await;

    harness.send("DATA").await;
    assert_eq!(harness.recv_line().await, "354 OK");
    for _ in 0..200 {
        harness.send("this line is comfortably longer than the tiny ceiling").await;
    }
    harness.send(".").await;
    assert_eq!(harness.recv_line().await, "250 2.0.0 <u@local> delivered");

    assert_eq!(concrete.delivered_messages().len(), 1);
}

/// S6: an untrusted client's `XCLIENT` is refused and leaves the session
/// state untouched — a subsequent `LHLO` still behaves normally.
#[tokio::test]
async fn s6_xclient_untrusted() {
    let mut setup = Setup::default();
    setup.trusted = false;

    let mut harness = spawn(setup);
    harness.recv_line().await;

    harness.send("XCLIENT ADDR=1.2.3.4").await;
    assert_eq!(harness.recv_line().await, "550 You are not from trusted IP");

    harness.send("LHLO a").await;
    let lhlo = harness.recv_reply().await;
    assert_eq!(lhlo.last().unwrap(), "250 PIPELINING");
}

/// A trusted client's `XCLIENT TIMEOUT=` is accepted like the other
/// attributes, and the session carries on normally afterward.
#[tokio::test]
async fn xclient_timeout_attribute_is_accepted() {
    let mut setup = Setup::default();
    setup.trusted = true;

    let mut harness = spawn(setup);
    harness.recv_line().await;

    harness.send("XCLIENT ADDR=1.2.3.4 TIMEOUT=30").await;
    assert_eq!(harness.recv_line().await, "220 mx.example.com LMTP ready");

    harness.send("LHLO a").await;
    let lhlo = harness.recv_reply().await;
    assert_eq!(lhlo.last().unwrap(), "250 PIPELINING");
}
