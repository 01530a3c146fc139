use clap::Parser;
use std::collections::{HashMap, HashSet};
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::process;
use tracing_subscriber::EnvFilter;

use zoned::protocol::types::{DomainName, QueryClass, QueryType, RecordClass, RecordType};
use zoned::server::{Event, Request, Response, Server, ServerOptions};
use zoned::settings::Settings;
use zoned::zones::{Serial, Span};

const DNS_PORT: u16 = 53;

fn begin_logging() {
    let log_format = if let Ok(var) = env::var("RUST_LOG_FORMAT") {
        let mut set = HashSet::new();
        for s in var.split(',') {
            set.insert(s.to_string());
        }
        set
    } else {
        HashSet::new()
    };

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

/// Walk a name towards the root until one of the configured apexes
/// matches, mirroring how the server picks the covering zone.
fn lookup_address(
    addresses: &HashMap<DomainName, Ipv4Addr>,
    name: &DomainName,
) -> Option<Ipv4Addr> {
    for i in 0..name.labels.len() {
        if let Some(apex) = DomainName::from_labels(name.labels[i..].to_vec()) {
            if let Some(address) = addresses.get(&apex) {
                return Some(*address);
            }
        }
    }

    None
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Clone, Parser)]
/// An authoritative DNS server for a static set of zones.
///
/// Zones are registered from the configuration file; queries for
/// names inside a zone are answered with the zone's configured
/// address (A queries) or from its SOA record, and queries outside
/// every zone are dropped without a response.
struct Args {
    /// Interface to listen on
    #[clap(short, long, value_parser, default_value_t = Ipv4Addr::UNSPECIFIED)]
    interface: Ipv4Addr,

    /// Port to listen on (UDP and TCP)
    #[clap(short, long, value_parser, default_value_t = DNS_PORT)]
    port: u16,

    /// Path to the configuration file
    #[clap(short, long, value_parser)]
    config: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    begin_logging();

    let settings = match &args.config {
        Some(path) => match Settings::new(path) {
            Ok(settings) => settings,
            Err(error) => {
                tracing::error!(?error, "could not load configuration");
                process::exit(1);
            }
        },
        None => Settings::default(),
    };

    let mut addresses = HashMap::new();
    for zone in &settings.zones {
        if let (Some(apex), Some(address)) =
            (DomainName::from_dotted_string(&zone.name), zone.address)
        {
            addresses.insert(apex, address);
        }
    }

    let handler = move |request: &Request, response: &mut Response| {
        if let [question] = &request.message.questions[..] {
            if question.qtype == QueryType::Record(RecordType::A)
                && question.qclass == QueryClass::Record(RecordClass::IN)
            {
                if let Some(address) = lookup_address(&addresses, &question.name) {
                    if response.end_address(&address.to_string()).is_ok() {
                        return;
                    }
                }
            }
        }

        // everything else is left to the authority conveniences
        response.end();
    };

    let options = ServerOptions {
        ttl: settings.default_ttl.unwrap_or_else(|| ServerOptions::default().ttl),
    };
    let mut server = Server::create(handler, options);

    for zone in &settings.zones {
        let parsed: Result<(Serial, Span, Span, Span, Span), _> = (|| {
            Ok::<_, zoned::zones::SpanFromStr>((
                zone.serial.parse()?,
                zone.refresh.parse()?,
                zone.retry.parse()?,
                zone.expire.parse()?,
                zone.minimum.parse()?,
            ))
        })();

        let (serial, refresh, retry, expire, minimum) = match parsed {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::error!(zone = %zone.name, %error, "bad zone timers");
                process::exit(1);
            }
        };

        if let Err(error) = server.zone(
            &zone.name,
            &zone.mname,
            &zone.rname,
            serial,
            refresh,
            retry,
            expire,
            minimum,
        ) {
            tracing::error!(zone = %zone.name, %error, "could not register zone");
            process::exit(1);
        }
    }

    let interface = settings.interface.unwrap_or(args.interface);
    let port = settings.port.unwrap_or(args.port);

    if let Err(error) = server.listen(port, IpAddr::V4(interface)).await {
        tracing::error!(?error, "could not bind sockets");
        process::exit(1);
    }

    let mut events = server.events().expect("events channel already taken");
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                Event::Listening { udp, tcp } => tracing::info!(%udp, %tcp, "listening"),
                Event::Close => tracing::info!("closed"),
                Event::Error(error) => tracing::warn!(%error, "server error"),
            }
        }
    });

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(?error, "could not wait for ctrl-c");
        process::exit(1);
    }

    server.close();
}
