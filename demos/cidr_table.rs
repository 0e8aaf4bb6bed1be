//! Load a CIDR table from a CSV file and answer lookups from the command line.
//!
//! ```text
//! cargo run --example cidr_table -- blocks.csv 10.10.10.1 127.0.0.1
//! ```
//!
//! Each line of the file is `a.b.c.d/n,value`.

use offheap_lookup::bulk::BulkLoadedPrefixMatch;
use offheap_lookup::ipv4::parse_address;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> offheap_lookup::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: cidr_table <blocks.csv> <address>...");
        std::process::exit(2);
    };

    let lookup = BulkLoadedPrefixMatch::new();
    let records = lookup.load_file(&path)?;
    info!(records, path = %path, "loaded CIDR table");

    for ip in args {
        let address = parse_address(&ip)?;
        match lookup.lookup(address) {
            Some(v) => println!("{ip}\t{}", String::from_utf8_lossy(&v)),
            None => println!("{ip}\t-"),
        }
    }

    lookup.tear_down();
    Ok(())
}
