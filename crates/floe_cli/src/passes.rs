//! The pass registry: named pipeline steps runnable from the standard
//! workflow or a user pass list.

use floe_chipdb::{ChipDB, Package};
use floe_common::{fatal, FatalError, RandomGenerator, Result};
use floe_diagnostics::LogSink;
use floe_netlist::write::{write_blif, write_verilog};
use floe_pnr::{DesignState, PlaceOptions};
use std::io::Write;

/// The version banner written into output files.
pub const VERSION: &str = concat!("floe ", env!("CARGO_PKG_VERSION"));

/// Pass names with their usage text, for `--list-passes`.
pub const PASS_USAGE: &[(&str, &str)] = &[
    ("read_blif", "read_blif <file>\n    Read a BLIF netlist."),
    ("read_pcf", "read_pcf <file>\n    Read physical constraints."),
    (
        "instantiate_io",
        "instantiate_io\n    Wrap bare top-level ports in SB_IO cells.",
    ),
    (
        "pack",
        "pack\n    Pack LUTs, flip-flops and carries into logic cells.",
    ),
    (
        "write_blif",
        "write_blif <file>\n    Write the current netlist as BLIF.",
    ),
    (
        "write_verilog",
        "write_verilog <file>\n    Write the current netlist as Verilog.",
    ),
    (
        "place_constraints",
        "place_constraints\n    Bind pin-constrained IOs and pre-place PLLs.",
    ),
    (
        "promote_globals",
        "promote_globals [-l|--no-promote-globals]\n    Promote high-fanout nets to the global networks.",
    ),
    (
        "realize_constants",
        "realize_constants\n    Drive remaining constant sinks from constant LCs.",
    ),
    (
        "place",
        "place [options]\n\
         \n\
         \x20   Place design using simulated annealing with half-perimeter wire\n\
         \x20   length cost function.  Design must be packed.\n\
         \n\
         \x20     -i, --improve-only\n\
         \x20       Only accept swaps that improve the cost function.\n\
         \n\
         \x20     -r, --place-random\n\
         \x20       Find a random placement, don't attempt to improve.\n\
         \n\
         \x20     -q, --optimize-qwp-position\n\
         \x20       Optimize qwp_position instead of wire length.\n\
         \n\
         \x20     -t <temp>\n\
         \x20       Initial simulated annealing temperature.  Default: 10000.0.",
    ),
    (
        "placement_from_loc",
        "placement_from_loc\n    Set placement from .loc attribute.",
    ),
    (
        "loc_from_placement",
        "loc_from_placement [-r|--readable]\n    Set .loc attribute from placement.",
    ),
    (
        "route",
        "route [-m <max-passes>]\n    Route the design with negotiated congestion.",
    ),
    (
        "write_conf",
        "write_conf <file>\n    Write the configuration as bitstream text.",
    ),
    (
        "write_pcf",
        "write_pcf <file>\n    Write resolved pin assignments.",
    ),
];

/// Prints the pass registry.
pub fn print_passes(w: &mut dyn Write) {
    for (_, usage) in PASS_USAGE {
        let _ = writeln!(w, "  {usage}\n");
    }
}

/// Holds the pipeline as passes construct it: the design state appears
/// once `read_blif` has run.
pub struct Driver<'a> {
    /// The device database.
    pub chipdb: &'a ChipDB,
    /// The selected package.
    pub package: &'a Package,
    /// The seed for the design state's generator.
    pub seed: u32,
    /// The state, once a netlist has been read.
    pub ds: Option<DesignState<'a>>,
    /// Router pass budget.
    pub max_passes: usize,
}

impl<'a> Driver<'a> {
    /// Creates a driver with no netlist yet.
    pub fn new(chipdb: &'a ChipDB, package: &'a Package, seed: u32) -> Self {
        Self {
            chipdb,
            package,
            seed,
            ds: None,
            max_passes: 10,
        }
    }

    fn ds(&mut self) -> Result<&mut DesignState<'a>> {
        match self.ds.as_mut() {
            Some(ds) => Ok(ds),
            None => fatal!("no netlist has been read"),
        }
    }

    /// Runs one named pass.
    pub fn run(&mut self, name: &str, args: &[String], sink: &LogSink) -> Result<()> {
        match name {
            "read_blif" => {
                let [file] = args else {
                    fatal!("read_blif: wrong number of arguments");
                };
                let design = if file == "-" {
                    let mut text = String::new();
                    std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)
                        .map_err(|e| FatalError::new(format!("read_blif: {e}")))?;
                    floe_blif::parse_blif("<stdin>", &text)?
                } else {
                    floe_blif::read_blif(file)?
                };
                self.ds = Some(DesignState::new(
                    self.chipdb,
                    self.package,
                    design,
                    RandomGenerator::new(self.seed),
                ));
                Ok(())
            }
            "read_pcf" => {
                let [file] = args else {
                    fatal!("read_pcf: wrong number of arguments");
                };
                let ds = self.ds()?;
                let constraints = floe_pcf::read_pcf(file, &ds.design, ds.package, sink)?;
                ds.constraints = constraints;
                Ok(())
            }
            "instantiate_io" => {
                if !args.is_empty() {
                    fatal!("instantiate_io: wrong number of arguments");
                }
                let ds = self.ds()?;
                floe_pack::instantiate_io(&mut ds.design)
            }
            "pack" => {
                if !args.is_empty() {
                    fatal!("pack: wrong number of arguments");
                }
                let chipdb = self.chipdb;
                let ds = self.ds()?;
                let mut chains = std::mem::take(&mut ds.chains);
                floe_pack::pack(chipdb, &mut ds.design, &mut chains, sink)?;
                ds.chains = chains;
                Ok(())
            }
            "write_blif" | "write_verilog" => {
                let [file] = args else {
                    fatal!("{name}: wrong number of arguments");
                };
                let ds = self.ds()?;
                let mut out = open_output(file)?;
                if name == "write_blif" {
                    write_blif(&ds.design, ds.top, &mut *out)
                } else {
                    write_verilog(&ds.design, ds.top, &mut *out)
                }
            }
            "place_constraints" => {
                if !args.is_empty() {
                    fatal!("place_constraints: wrong number of arguments");
                }
                floe_pnr::place_constraints(self.ds()?)
            }
            "promote_globals" => {
                let mut do_promote = true;
                for arg in args {
                    match arg.as_str() {
                        "-l" | "--no-promote-globals" => do_promote = false,
                        _ => fatal!("unexpected argument `{arg}'"),
                    }
                }
                floe_pnr::promote_globals(self.ds()?, do_promote, sink)
            }
            "realize_constants" => {
                if !args.is_empty() {
                    fatal!("realize_constants: wrong number of arguments");
                }
                let ds = self.ds()?;
                floe_pack::realize_constants(&mut ds.design, sink)
            }
            "place" => {
                let mut opts = PlaceOptions::default();
                let mut it = args.iter();
                while let Some(arg) = it.next() {
                    match arg.as_str() {
                        "-i" | "--improve-only" => opts.improve_only = true,
                        "-q" | "--optimize-qwp-position" => opts.qwp = true,
                        "-r" | "--place-random" => opts.place_random = true,
                        "-t" => {
                            let Some(temp) = it.next() else {
                                fatal!("-t: expected argument");
                            };
                            opts.init_temp = temp
                                .parse()
                                .map_err(|_| FatalError::new("-t: invalid temperature"))?;
                        }
                        _ => fatal!("unexpected argument `{arg}'"),
                    }
                }
                floe_pnr::place(self.ds()?, &opts, sink)
            }
            "placement_from_loc" => {
                if !args.is_empty() {
                    fatal!("placement_from_loc: wrong number of arguments");
                }
                floe_pnr::placement_from_loc(self.ds()?)
            }
            "loc_from_placement" => {
                let mut readable = false;
                for arg in args {
                    match arg.as_str() {
                        "-r" | "--readable" => readable = true,
                        _ => fatal!("unexpected argument `{arg}'"),
                    }
                }
                floe_pnr::loc_from_placement(self.ds()?, readable)
            }
            "route" => {
                let mut max_passes = self.max_passes;
                let mut it = args.iter();
                while let Some(arg) = it.next() {
                    match arg.as_str() {
                        "-m" => {
                            let Some(n) = it.next() else {
                                fatal!("-m: expected argument");
                            };
                            max_passes = n
                                .parse()
                                .map_err(|_| FatalError::new("-m: invalid pass count"))?;
                        }
                        _ => fatal!("unexpected argument `{arg}'"),
                    }
                }
                floe_pnr::route(self.ds()?, max_passes, sink)
            }
            "write_conf" => {
                let [file] = args else {
                    fatal!("write_conf: wrong number of arguments");
                };
                let ds = self.ds()?;
                let mut out = open_output(file)?;
                ds.conf.write_txt(
                    &mut *out,
                    VERSION,
                    ds.chipdb,
                    &ds.design,
                    &ds.placement,
                    &ds.cnet_net,
                )
            }
            "write_pcf" => {
                let [file] = args else {
                    fatal!("write_pcf: wrong number of arguments");
                };
                let ds = self.ds()?;
                let mut out = open_output(file)?;
                floe_pcf::write_pcf(
                    &mut *out,
                    VERSION,
                    &ds.design,
                    &ds.models,
                    ds.chipdb,
                    ds.package,
                    &ds.placement,
                )
            }
            _ => fatal!("unknown pass `{name}'"),
        }
    }

    /// Executes a pass-list file: one `passname args...` per line,
    /// `#` comments.
    pub fn run_passlist(&mut self, path: &str, sink: &LogSink) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| FatalError::new(format!("failed to open `{path}': {e}")))?;
        let mut reader = floe_diagnostics::LineReader::new(path, &text);
        loop {
            reader.read_line()?;
            if reader.eof() {
                return Ok(());
            }
            let name = reader.words[0].clone();
            let args: Vec<String> = reader.words[1..].to_vec();
            sink.noteln(format!("{name}..."));
            self.run(&name, &args, sink)?;
        }
    }
}

/// Opens an output file, with `-` meaning stdout.
pub fn open_output(file: &str) -> Result<Box<dyn Write>> {
    if file == "-" {
        Ok(Box::new(std::io::stdout()))
    } else {
        let f = std::fs::File::create(file)
            .map_err(|e| FatalError::new(format!("failed to open `{file}': {e}")))?;
        Ok(Box::new(f))
    }
}
