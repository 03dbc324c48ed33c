//! Binary entry point: load configuration, wire up the collaborators
//! (`Directory`, `MailStore`, the anvil concurrency registry), bind the LMTP
//! listener and drive the accept loop until shutdown.

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::{net::SocketAddr, path::Path, sync::Arc};

use tokio::{net::TcpListener, sync::watch};

use anvil::InProcessAnvil;
use directory::memory::MemoryDirectory;
use lmtp::delivery::proxy::UnavailableProxyClient;
use lmtp::router::Router;
use lmtp::session::{dispatcher::Dispatcher, SessionState};
use lmtp::transport::LineTransport;
use lmtp::LmtpConfig;
use store::memory::MemoryStore;
use utils::config::Config;
use utils::listener::{limiter::ConcurrencyLimiter, ServerInstance, ServerProtocol};

const CONFIG_ENV_VAR: &str = "LMTP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "/etc/stalwart/lmtp.toml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let raw = std::fs::read_to_string(&config_path).unwrap_or_default();
    let mut config = Config::parse(&raw);
    let lmtp_config = LmtpConfig::parse(&mut config);

    for err in std::mem::take(&mut config.errors) {
        trc::event!(
            trc::EventType::ConfigError,
            "key" => err.key,
            "reason" => err.reason,
        )
        .log();
    }

    let store: Arc<dyn store::MailStore> = Arc::new(MemoryStore::new(lmtp_config.base_dir.clone()));
    let directory: Arc<dyn directory::Directory> = Arc::new(MemoryDirectory::new());
    let anvil: Arc<dyn anvil::ConcurrencyRegistry> =
        Arc::new(InProcessAnvil::new(lmtp_config.max_concurrent_per_user));

    let router = Router {
        directory,
        store: store.clone(),
        anvil,
        service_name: "lmtp".to_string(),
        my_hostname: lmtp_config.greeting_domain.clone(),
        recipient_delimiter: lmtp_config.recipient_delimiter,
        proxying_enabled: lmtp_config.proxy_enabled,
        max_concurrent_per_user: lmtp_config.max_concurrent_per_user,
    };

    let tls_acceptor = match (config.value("lmtp.tls.cert-path"), config.value("lmtp.tls.key-path")) {
        (Some(cert), Some(key)) => utils::tls::load_acceptor(Path::new(cert), Path::new(key)).ok(),
        _ => None,
    };

    let dispatcher = Arc::new(Dispatcher {
        router,
        store,
        proxy_client: Arc::new(UnavailableProxyClient),
        tls_acceptor,
        config: lmtp_config.clone(),
    });

    let bind_addr: SocketAddr = config
        .value("lmtp.listen")
        .unwrap_or("0.0.0.0:24")
        .parse()
        .expect("invalid lmtp.listen address");

    let listener = match TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            trc::event!(trc::EventType::ConfigError, "key" => "lmtp.listen", "reason" => err.to_string()).log();
            return;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = Arc::new(ServerInstance {
        id: "lmtp".to_string(),
        listener_id: 0,
        protocol: ServerProtocol::Lmtp,
        hostname: lmtp_config.greeting_domain.clone(),
        data: "LMTP".to_string(),
        is_tls_implicit: false,
        limiter: ConcurrencyLimiter::new(config.property::<usize>("lmtp.max-connections").unwrap_or(0)),
        shutdown_rx,
    });

    trc::event!(trc::EventType::ConnectionStart, "session-id" => "listener", "remote-ip" => bind_addr.ip()).log();

    loop {
        if server.is_shutting_down() {
            break;
        }
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(_) => continue,
                };
                let Some(in_flight) = server.limiter.is_allowed() else {
                    drop(stream);
                    continue;
                };
                let local_addr = stream.local_addr().unwrap_or(bind_addr);
                let trusted = lmtp_config.is_trusted(&peer.ip());
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let transport = LineTransport::new(Box::new(stream));
                    let mut state = SessionState::new(
                        format!("{:016x}", rand::random::<u64>()),
                        peer.ip(),
                        peer.port(),
                        local_addr.ip(),
                        local_addr.port(),
                        trusted,
                        5,
                    );
                    state.in_flight.push(in_flight);
                    dispatcher.run(transport, state).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = shutdown_tx.send(true);
                break;
            }
        }
    }
}
