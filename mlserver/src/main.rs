use std::io;

use log::{info, warn};
use tokio::{net::TcpListener, signal};

use mlserver::{config::ServerConfig, service::Service, session::Session, store::WeightStore};

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = ServerConfig::from_env();
    let list = TcpListener::bind(&config.addr).await?;
    info!("listening at {}", config.addr);

    let store = WeightStore::new(config.weights_dir);
    let mut service = Service::new(Session::new(store));

    // One client at a time: buffers and the model instance outlive connections,
    // so the session carries over from one client to the next.
    loop {
        tokio::select! {
            accepted = list.accept() => {
                let (stream, addr) = accepted?;
                info!("client connected from {addr}");

                let (rx, tx) = stream.into_split();
                let (rx, tx) = comms::channel(rx, tx);

                if let Err(e) = service.serve(rx, tx).await {
                    warn!("connection ended with io error {e}");
                }

                info!("client disconnected");
            }
            _ = signal::ctrl_c() => {
                info!("received ctrl-c");
                break Ok(());
            }
        }
    }
}
