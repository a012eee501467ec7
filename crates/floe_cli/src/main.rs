//! floe — place and route for iCE40-class FPGAs.
//!
//! Reads a technology-mapped BLIF netlist, packs it onto the device's
//! logic cells, places by simulated annealing, routes with negotiated
//! congestion, and writes a textual bitstream.

mod passes;

use clap::Parser;
use floe_common::{fatal, FatalError, Result};
use floe_diagnostics::LogSink;
use passes::{open_output, print_passes, Driver, VERSION};
use std::hash::{BuildHasher, Hasher};
use std::io::Write;

/// Place and route netlist.  Input file is in BLIF format.  Output is
/// (text) bitstream.
#[derive(Parser, Debug)]
#[command(name = "floe", disable_version_flag = true)]
struct Cli {
    /// Don't output progress messages.
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print version and exit.
    #[arg(short = 'v', long = "version")]
    version: bool,

    /// Print list of supported passes with usage and exit.
    #[arg(short = 't', long = "list-passes")]
    list_passes: bool,

    /// Target device: 1k (iCE40LP/HX1K) or 8k (iCE40LP/HX8K).
    #[arg(short = 'd', long, default_value = "1k")]
    device: String,

    /// Target package.  Default: tq144 for 1k, ct256 for 8k.
    #[arg(short = 'P', long = "package")]
    package: Option<String>,

    /// Read chip database from this file.
    /// Default: +/share/arachne-pnr/chipdb-<device>.bin
    #[arg(short = 'c', long = "chipdb")]
    chipdb: Option<String>,

    /// Write binary chipdb to this file and exit.
    #[arg(long = "write-binary-chipdb", value_name = "FILE")]
    write_binary_chipdb: Option<String>,

    /// Read physical constraints from this file.
    #[arg(short = 'p', long = "pcf-file", value_name = "FILE")]
    pcf_file: Option<String>,

    /// Write pin assignments to this file after placement.
    #[arg(short = 'w', long = "write-pcf", value_name = "FILE")]
    write_pcf: Option<String>,

    /// Input must include placement (`loc` attributes).
    #[arg(long = "route-only")]
    route_only: bool,

    /// Don't promote nets to globals.
    #[arg(short = 'l', long = "no-promote-globals")]
    no_promote_globals: bool,

    /// Write post-pack netlist to this file as BLIF.
    #[arg(short = 'B', long = "post-pack-blif", value_name = "FILE")]
    post_pack_blif: Option<String>,

    /// Write post-pack netlist to this file as Verilog.
    #[arg(short = 'V', long = "post-pack-verilog", value_name = "FILE")]
    post_pack_verilog: Option<String>,

    /// Write post-place netlist to this file as BLIF.
    #[arg(long = "post-place-blif", value_name = "FILE")]
    post_place_blif: Option<String>,

    /// Write output to this file.
    #[arg(short = 'o', long = "output-file", default_value = "-")]
    output_file: String,

    /// Set seed for random generator.
    #[arg(short = 's', long = "seed", default_value_t = 1)]
    seed: u32,

    /// Randomize seed.
    #[arg(short = 'r')]
    randomize_seed: bool,

    /// Execute this pass-list file instead of the standard workflow.
    #[arg(short = 'e', value_name = "PASSLIST-FILE")]
    passlist: Option<String>,

    /// Input BLIF netlist.
    #[arg(default_value = "-")]
    input_file: String,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

/// A nonzero seed from the hasher's OS-seeded entropy.
fn random_seed() -> u32 {
    let state = std::collections::hash_map::RandomState::new();
    loop {
        let seed = state.build_hasher().finish() as u32;
        if seed != 0 {
            return seed;
        }
    }
}

/// The default chipdb path: `<exe>/../share/arachne-pnr/chipdb-<dev>.bin`.
fn default_chipdb_path(device: &str) -> String {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_default();
    exe_dir
        .join("..")
        .join("share")
        .join("arachne-pnr")
        .join(format!("chipdb-{device}.bin"))
        .to_string_lossy()
        .into_owned()
}

/// Loads a chipdb, sniffing the binary magic.
fn load_chipdb(path: &str) -> Result<floe_chipdb::ChipDB> {
    let bytes = std::fs::read(path)
        .map_err(|e| FatalError::new(format!("read_chipdb: failed to open `{path}': {e}")))?;
    if bytes.starts_with(b"floechdb") {
        floe_chipdb::read_binary_chipdb(&bytes[..])
    } else {
        let text = String::from_utf8(bytes)
            .map_err(|_| FatalError::new(format!("read_chipdb: `{path}' is not text")))?;
        floe_chipdb::parse_chipdb(path, &text)
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.version {
        println!("{VERSION}");
        return Ok(());
    }
    if cli.list_passes {
        println!("Supported passes:\n");
        print_passes(&mut std::io::stdout());
        return Ok(());
    }

    let sink = LogSink::stderr(cli.quiet);

    if cli.device != "1k" && cli.device != "8k" {
        fatal!("unknown device: {}", cli.device);
    }
    let package_name = match &cli.package {
        Some(p) => p.clone(),
        None if cli.device == "1k" => "tq144".to_string(),
        None => "ct256".to_string(),
    };

    let mut seed = cli.seed;
    if cli.randomize_seed {
        seed = random_seed();
    }
    sink.noteln(format!("seed: {seed}"));
    if seed == 0 {
        fatal!("zero seed");
    }

    sink.noteln(format!("device: {}", cli.device));
    let chipdb_path = cli
        .chipdb
        .clone()
        .unwrap_or_else(|| default_chipdb_path(&cli.device));
    sink.noteln(format!("read_chipdb {chipdb_path}..."));
    let chipdb = load_chipdb(&chipdb_path)?;

    if let Some(out) = &cli.write_binary_chipdb {
        sink.noteln(format!("write_binary_chipdb {out}"));
        let mut w = open_output(out)?;
        floe_chipdb::write_binary_chipdb(&mut *w, &chipdb)?;
        w.flush()
            .map_err(|e| FatalError::new(format!("write: {e}")))?;
        return Ok(());
    }

    let packages: Vec<&str> = chipdb.packages.keys().map(String::as_str).collect();
    sink.noteln(format!("  supported packages: {}", packages.join(", ")));

    let Some(package) = chipdb.packages.get(&package_name) else {
        fatal!("unknown package `{package_name}'");
    };

    let mut driver = Driver::new(&chipdb, package, seed);

    if let Some(passlist) = &cli.passlist {
        return driver.run_passlist(passlist, &sink);
    }

    let run_pass = |driver: &mut Driver, name: &str, args: &[&str]| -> Result<()> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        driver.run(name, &args, &sink)
    };

    run_pass(&mut driver, "read_blif", &[&cli.input_file])?;

    if cli.route_only {
        run_pass(&mut driver, "placement_from_loc", &[])?;
    } else {
        if let Some(pcf) = &cli.pcf_file {
            run_pass(&mut driver, "read_pcf", &[pcf])?;
        }
        run_pass(&mut driver, "instantiate_io", &[])?;
        run_pass(&mut driver, "pack", &[])?;

        if let Some(f) = &cli.post_pack_blif {
            run_pass(&mut driver, "write_blif", &[f])?;
        }
        if let Some(f) = &cli.post_pack_verilog {
            run_pass(&mut driver, "write_verilog", &[f])?;
        }

        run_pass(&mut driver, "place_constraints", &[])?;
        if cli.no_promote_globals {
            run_pass(&mut driver, "promote_globals", &["--no-promote-globals"])?;
        } else {
            run_pass(&mut driver, "promote_globals", &[])?;
        }
        run_pass(&mut driver, "realize_constants", &[])?;
        run_pass(&mut driver, "place", &[])?;

        if let Some(f) = &cli.write_pcf {
            run_pass(&mut driver, "write_pcf", &[f])?;
        }
        if let Some(f) = &cli.post_place_blif {
            run_pass(&mut driver, "loc_from_placement", &[])?;
            run_pass(&mut driver, "write_blif", &[f])?;
        }
    }

    run_pass(&mut driver, "route", &[])?;
    run_pass(&mut driver, "write_conf", &[&cli.output_file])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn tiny_chipdb_text() -> String {
        // The router test fabric: two IO tiles around a logic tile, a
        // data path to every LC position.
        let mut text = String::from(
            ".device 1k 3 3 29\n\
             .pins tq144\n1 1 0 0\n2 1 2 0\n\
             .io_tile 1 0\n.io_tile 1 2\n\
             .logic_tile 1 1\n\
             .logic_tile_bits 20 16\nNegClk B0[0]\nCarryInSet B1[0]\n",
        );
        for pos in 0..8 {
            text.push_str(&format!("LC_{pos}"));
            for i in 0..20 {
                text.push_str(&format!(" B{}[{}]", 2 + pos, i));
            }
            text.push('\n');
        }
        text.push_str(".io_tile_bits 10 4\nNegClk B0[0]\n");
        for pos in 0..2 {
            for i in 0..6 {
                text.push_str(&format!("IOB_{pos}.PIN_TYPE_{i} B{}[{}]\n", 1 + pos, i));
            }
        }
        text.push_str(
            ".net 8\n1 0 io_0/D_IN_0\n\
             .net 9\n1 0 span4_h_0\n1 1 span4_h_0\n",
        );
        for pos in 0..8 {
            text.push_str(&format!(".net {}\n1 1 lutff_{pos}/in_0\n", 10 + pos));
            text.push_str(&format!(".net {}\n1 1 lutff_{pos}/out\n", 18 + pos));
        }
        text.push_str(
            ".net 26\n1 1 span4_v_0\n1 2 span4_v_0\n\
             .net 27\n1 2 io_0/D_OUT_0\n\
             .net 28\n1 1 local_g0_0\n\
             .buffer 1 0 9 B3[0]\n1 8\n\
             .buffer 1 1 28 B11[0]\n1 9\n",
        );
        for pos in 0..8 {
            text.push_str(&format!(".buffer 1 1 {} B12[{pos}]\n1 28\n", 10 + pos));
        }
        text.push_str(".buffer 1 1 26 B13[0] B13[1] B13[2]\n");
        for pos in 0..8usize {
            text.push_str(&format!(
                "{}{}{} {}\n",
                pos & 1,
                (pos >> 1) & 1,
                (pos >> 2) & 1,
                18 + pos
            ));
        }
        text.push_str(".buffer 1 2 27 B3[1]\n1 26\n");
        text
    }

    const BUF_BLIF: &str = ".model top\n.inputs a\n.outputs y\n\
                            .gate SB_LUT4 O=y I0=a\n.param LUT_INIT 10\n.end\n";

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn full_flow(dir: &tempfile::TempDir, seed: u32) -> String {
        let chipdb = write_file(dir, "chipdb.txt", &tiny_chipdb_text());
        let blif = write_file(dir, "top.blif", BUF_BLIF);
        let pcf = write_file(dir, "top.pcf", "set_io a 1\nset_io y 2\n");
        let out = dir.path().join(format!("out-{seed}.asc"));
        let seed_str = seed.to_string();

        let cli = Cli::parse_from([
            "floe",
            "-q",
            "-c",
            chipdb.as_str(),
            "-p",
            pcf.as_str(),
            "-s",
            seed_str.as_str(),
            "-o",
            out.to_str().unwrap(),
            blif.as_str(),
        ]);
        run(&cli).unwrap();
        std::fs::read_to_string(out).unwrap()
    }

    #[test]
    fn cli_structure_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_options() {
        let cli = Cli::parse_from(["floe"]);
        assert_eq!(cli.device, "1k");
        assert_eq!(cli.seed, 1);
        assert_eq!(cli.input_file, "-");
        assert_eq!(cli.output_file, "-");
        assert!(!cli.quiet && !cli.route_only);
    }

    #[test]
    fn unknown_device_is_fatal() {
        let cli = Cli::parse_from(["floe", "-d", "4k"]);
        let err = run(&cli).unwrap_err();
        assert!(err.to_string().contains("unknown device: 4k"));
    }

    #[test]
    fn full_flow_produces_bitstream() {
        let dir = tempfile::tempdir().unwrap();
        let asc = full_flow(&dir, 1);
        assert!(asc.contains(".device 1k\n"));
        assert!(asc.contains(".logic_tile 1 1\n"));
        assert!(asc.contains(".io_tile 1 0\n"));
        assert!(asc.contains(".sym "));
    }

    #[test]
    fn same_seed_reproduces_bitstream() {
        let dir = tempfile::tempdir().unwrap();
        let a = full_flow(&dir, 7);
        let dir2 = tempfile::tempdir().unwrap();
        let b = full_flow(&dir2, 7);
        assert_eq!(a, b);
    }

    #[test]
    fn binary_chipdb_roundtrip_through_cli() {
        let dir = tempfile::tempdir().unwrap();
        let chipdb = write_file(&dir, "chipdb.txt", &tiny_chipdb_text());
        let bin = dir.path().join("chipdb.bin");

        let cli = Cli::parse_from([
            "floe",
            "-q",
            "-c",
            chipdb.as_str(),
            "--write-binary-chipdb",
            bin.to_str().unwrap(),
        ]);
        run(&cli).unwrap();

        let from_text = load_chipdb(&chipdb).unwrap();
        let from_bin = load_chipdb(bin.to_str().unwrap()).unwrap();
        assert_eq!(from_text.device, from_bin.device);
        assert_eq!(from_text.tile_nets, from_bin.tile_nets);
        assert_eq!(from_text.switches, from_bin.switches);
    }

    #[test]
    fn route_only_reproduces_bitstream() {
        let dir = tempfile::tempdir().unwrap();
        let chipdb = write_file(&dir, "chipdb.txt", &tiny_chipdb_text());
        let blif = write_file(&dir, "top.blif", BUF_BLIF);
        let pcf = write_file(&dir, "top.pcf", "set_io a 1\nset_io y 2\n");
        let out1 = dir.path().join("one.asc");
        let placed = dir.path().join("placed.blif");

        let cli = Cli::parse_from([
            "floe",
            "-q",
            "-c",
            chipdb.as_str(),
            "-p",
            pcf.as_str(),
            "-o",
            out1.to_str().unwrap(),
            "--post-place-blif",
            placed.to_str().unwrap(),
            blif.as_str(),
        ]);
        run(&cli).unwrap();

        // Re-ingest the placed netlist with a different seed; the
        // placement comes from the loc attributes, so the bitstream must
        // match.
        let out2 = dir.path().join("two.asc");
        let cli = Cli::parse_from([
            "floe",
            "-q",
            "-c",
            chipdb.as_str(),
            "--route-only",
            "-s",
            "99",
            "-o",
            out2.to_str().unwrap(),
            placed.to_str().unwrap(),
        ]);
        run(&cli).unwrap();

        let a = std::fs::read_to_string(out1).unwrap();
        let b = std::fs::read_to_string(out2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn passlist_drives_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let chipdb = write_file(&dir, "chipdb.txt", &tiny_chipdb_text());
        let blif = write_file(&dir, "top.blif", BUF_BLIF);
        let pcf = write_file(&dir, "top.pcf", "set_io a 1\nset_io y 2\n");
        let out = dir.path().join("out.asc");
        let passlist = write_file(
            &dir,
            "flow.pass",
            &format!(
                "read_blif {blif}\n\
                 read_pcf {pcf}\n\
                 instantiate_io\n\
                 pack\n\
                 place_constraints\n\
                 promote_globals\n\
                 realize_constants\n\
                 place\n\
                 route\n\
                 write_conf {}\n",
                out.to_str().unwrap()
            ),
        );

        let cli = Cli::parse_from(["floe", "-q", "-c", chipdb.as_str(), "-e", passlist.as_str()]);
        run(&cli).unwrap();
        assert!(std::fs::read_to_string(out).unwrap().contains(".device 1k"));
    }
}
