use std::{error::Error, fs, io::Write, net::SocketAddr, path::Path};

use tracing::{info, warn};

use cli::Args;
use node::{GossipNode, NodeConfig, ACCEPT_IDLE_TIMEOUT, CYCLE_INTERVAL};

mod cli;
mod gossip;
mod node;

const OUTPUT_DIRECTORY: &str = "data";

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let args = Args::parse()?;

    let records = load_records(args.get_data_path())?;

    info!(
        "starting gossip node at [{}] with {} record(s) to disseminate",
        args.get_public_addr(),
        records.len()
    );

    let config = NodeConfig {
        public_addr: args.get_public_addr(),
        bind_port: args.get_self_port(),
        peers: args.get_peers().to_vec(),
        propagation_rounds: args.get_rounds(),
        fanout: args.get_fanout(),
        cycle_interval: CYCLE_INTERVAL,
        accept_idle_timeout: ACCEPT_IDLE_TIMEOUT,
    };

    let node = GossipNode::new(config, records);

    let payloads = node.run()?;

    write_output(args.get_public_addr(), &payloads)?;

    for payload in &payloads {
        println!("{}", payload);
    }

    Ok(())
}

/// Loads the records to disseminate from the file at `path`.
///
/// The first line is a header and skipped. Blank lines and
/// lines containing the frame delimiter `|` are skipped as
/// well: the wire codec performs no escaping, so such lines
/// cannot be framed.
fn load_records(path: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("cannot read the record file [{}]: {}", path, err))?;

    let mut records = Vec::new();

    for line in contents.lines().skip(1) {
        let line = line.trim_end();

        if line.is_empty() {
            continue;
        }

        if line.contains('|') {
            warn!("skipped a record containing the frame delimiter: {}", line);
            continue;
        }

        records.push(line.to_string());
    }

    Ok(records)
}

/// Persists the merged database to
/// `data/<public-addr>.txt`, one payload per line.
fn write_output(public_addr: SocketAddr, payloads: &[String]) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(OUTPUT_DIRECTORY)
        .map_err(|err| format!("cannot create the output directory: {}", err))?;

    let output_path = Path::new(OUTPUT_DIRECTORY).join(format!("{}.txt", public_addr));

    let mut output_file = fs::File::create(&output_path)
        .map_err(|err| format!("cannot create the output file: {}", err))?;

    for payload in payloads {
        writeln!(output_file, "{}", payload)?;
    }

    info!("merged database written to [{}]", output_path.display());

    Ok(())
}
