//! Physical constraint files: `set_io` parsing and post-place writeback.

use floe_chipdb::{ChipDB, Location, Package};
use floe_common::{FatalError, Result};
use floe_diagnostics::{LineReader, LogSink};
use floe_netlist::{Design, InstanceId, Models, NodeRef};
use std::collections::BTreeMap;
use std::io::Write;

/// Resolved pin constraints: top-level net name to PIO site.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    /// Net name to constrained location.
    pub net_pin_loc: BTreeMap<String, Location>,
}

/// Reads a PCF file.
pub fn read_pcf(
    path: &str,
    d: &Design,
    package: &Package,
    sink: &LogSink,
) -> Result<Constraints> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FatalError::new(format!("read_pcf: failed to open `{path}': {e}")))?;
    parse_pcf(path, &text, d, package, sink)
}

/// Parses PCF text: whitespace-tokenized `set_io [--warn-no-port] <net>
/// <pin>` lines. Unknown directives are errors; duplicate nets or pins
/// are errors.
pub fn parse_pcf(
    file: &str,
    text: &str,
    d: &Design,
    package: &Package,
    sink: &LogSink,
) -> Result<Constraints> {
    let mut r = LineReader::new(file, text);
    let top = d.top();

    let mut net_pin_loc: BTreeMap<String, Location> = BTreeMap::new();
    let mut pin_loc_net: BTreeMap<Location, String> = BTreeMap::new();

    loop {
        r.read_line()?;
        if r.eof() {
            break;
        }
        let cmd = r.words[0].as_str();
        if cmd != "set_io" {
            return Err(r.fatal(format!("unknown command `{cmd}'")));
        }

        let mut err_no_port = true;
        let mut net_name: Option<&str> = None;
        let mut pin_name: Option<&str> = None;
        for w in &r.words[1..] {
            if let Some(opt) = w.strip_prefix('-') {
                if opt == "-warn-no-port" {
                    err_no_port = false;
                } else {
                    return Err(r.fatal(format!("unknown option `{w}'")));
                }
            } else if net_name.is_none() {
                net_name = Some(w);
            } else if pin_name.is_none() {
                pin_name = Some(w);
            } else {
                return Err(r.fatal("set_io: too many arguments"));
            }
        }
        let (Some(net_name), Some(pin_name)) = (net_name, pin_name) else {
            return Err(r.fatal("set_io: too few arguments"));
        };

        if d.find_port(NodeRef::Model(top), net_name).is_none() {
            let msg = format!(
                "no port `{net_name}' in top-level module `{}'",
                d.model(top).name
            );
            if err_no_port {
                return Err(r.fatal(msg));
            }
            sink.warning(format!("{msg}, constraint ignored."));
            continue;
        }

        let Some(&loc) = package.pin_loc.get(pin_name) else {
            return Err(r.fatal(format!(
                "unknown pin `{pin_name}' on package `{}'",
                package.name
            )));
        };

        if net_pin_loc.contains_key(net_name) {
            return Err(r.fatal(format!(
                "duplicate pin constraints for net `{net_name}'"
            )));
        }
        if pin_loc_net.contains_key(&loc) {
            return Err(r.fatal(format!("duplicate pin constraints for pin `{pin_name}'")));
        }

        net_pin_loc.insert(net_name.to_string(), loc);
        pin_loc_net.insert(loc, net_name.to_string());
    }

    Ok(Constraints { net_pin_loc })
}

/// Writes the resolved IO constraints of a placement back out as PCF.
pub fn write_pcf(
    w: &mut dyn Write,
    version: &str,
    d: &Design,
    models: &Models,
    chipdb: &ChipDB,
    package: &Package,
    placement: &BTreeMap<InstanceId, usize>,
) -> Result<()> {
    let io_err = |e: std::io::Error| FatalError::new(format!("write_pcf: {e}"));
    writeln!(w, "# {version}").map_err(io_err)?;
    for (&inst, &cell) in placement {
        if !models.is_io(d, inst) {
            continue;
        }
        let loc = chipdb.cell_location[cell];
        let Some(pin) = package.loc_pin.get(&loc) else {
            continue;
        };
        let pkg_pin = d
            .find_port(NodeRef::Instance(inst), "PACKAGE_PIN")
            .expect("SB_IO without PACKAGE_PIN");
        let Some(top_port) = d.connection_other_port(pkg_pin) else {
            continue;
        };
        writeln!(w, "set_io {} {}", d.port(top_port).name, pin).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_netlist::models::create_standard_models;
    use floe_netlist::{Direction, Value};

    fn fixture() -> (Design, Package) {
        let mut d = Design::new();
        create_standard_models(&mut d).unwrap();
        let top = d.add_model("top").unwrap();
        d.set_top(top);
        for name in ["clk", "led"] {
            let p = d.add_port(NodeRef::Model(top), name, Direction::In, Value::X);
            let n = d.find_or_add_net(top, name);
            d.connect(p, n);
        }
        let mut package = Package {
            name: "tq144".into(),
            ..Package::default()
        };
        package.pin_loc.insert("21".into(), Location::new(5, 0));
        package.pin_loc.insert("22".into(), Location::new(5, 1));
        package.loc_pin.insert(Location::new(5, 0), "21".into());
        package.loc_pin.insert(Location::new(5, 1), "22".into());
        (d, package)
    }

    #[test]
    fn parses_set_io() {
        let (d, pkg) = fixture();
        let sink = LogSink::capture();
        let c = parse_pcf("t.pcf", "set_io clk 21\nset_io led 22\n", &d, &pkg, &sink).unwrap();
        assert_eq!(c.net_pin_loc["clk"], Location::new(5, 0));
        assert_eq!(c.net_pin_loc["led"], Location::new(5, 1));
    }

    #[test]
    fn duplicate_pin_is_fatal() {
        let (d, pkg) = fixture();
        let sink = LogSink::capture();
        let err = parse_pcf("t.pcf", "set_io clk 21\nset_io led 21\n", &d, &pkg, &sink)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("duplicate pin constraints for pin `21'"));
    }

    #[test]
    fn duplicate_net_is_fatal() {
        let (d, pkg) = fixture();
        let sink = LogSink::capture();
        let err = parse_pcf("t.pcf", "set_io clk 21\nset_io clk 22\n", &d, &pkg, &sink)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("duplicate pin constraints for net `clk'"));
    }

    #[test]
    fn unknown_pin_is_fatal() {
        let (d, pkg) = fixture();
        let sink = LogSink::capture();
        let err = parse_pcf("t.pcf", "set_io clk 99\n", &d, &pkg, &sink).unwrap_err();
        assert!(err.to_string().contains("unknown pin `99'"));
    }

    #[test]
    fn missing_port_warns_with_flag() {
        let (d, pkg) = fixture();
        let sink = LogSink::capture();
        let c = parse_pcf(
            "t.pcf",
            "set_io --warn-no-port nope 21\nset_io clk 22\n",
            &d,
            &pkg,
            &sink,
        )
        .unwrap();
        assert!(!c.net_pin_loc.contains_key("nope"));
        assert!(sink.captured().contains("warning: no port `nope'"));
        // And without the flag it is fatal.
        assert!(parse_pcf("t.pcf", "set_io nope 21\n", &d, &pkg, &sink).is_err());
    }

    #[test]
    fn unknown_command_is_fatal() {
        let (d, pkg) = fixture();
        let sink = LogSink::capture();
        let err = parse_pcf("t.pcf", "set_frequency clk 12\n", &d, &pkg, &sink).unwrap_err();
        assert!(err.to_string().contains("unknown command `set_frequency'"));
    }

    #[test]
    fn comments_and_blanks_ignored() {
        let (d, pkg) = fixture();
        let sink = LogSink::capture();
        let c = parse_pcf(
            "t.pcf",
            "# constraints\n\nset_io clk 21 # system clock\n",
            &d,
            &pkg,
            &sink,
        )
        .unwrap();
        assert_eq!(c.net_pin_loc.len(), 1);
    }
}
