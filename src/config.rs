use ini::Ini;
use std::net::SocketAddr;
use std::path::Path;

/// Settings of one overlay node, read from an INI file
#[derive(Debug)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub worker_threads: usize,
    pub stabilization_interval_ms: u64,
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Config> {
        let conf = Ini::load_from_file(path)?;

        let chord = conf
            .section(Some("chord"))
            .ok_or("missing section `chord`")?;

        let listen_address = chord
            .get("listen_address")
            .ok_or("missing value `listen_address`")?
            .parse()?;

        let worker_threads = match chord.get("worker_threads") {
            Some(value) => value.parse()?,
            None => 4,
        };

        let stabilization_interval_ms = match chord.get("stabilization_interval_ms") {
            Some(value) => value.parse()?,
            None => 30_000,
        };

        Ok(Config {
            listen_address,
            worker_threads,
            stabilization_interval_ms,
        })
    }
}
