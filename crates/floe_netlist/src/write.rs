//! BLIF and Verilog reflection of a model.
//!
//! Used for the post-pack and post-place netlist dumps. Net output names
//! come from [`Design::shared_names`], so port-backed nets keep their port
//! name and everything else is deduplicated.

use crate::constant::Value;
use crate::design::{Design, Direction};
use crate::ids::ModelId;
use floe_common::{FatalError, Result};
use std::io::Write;

fn io_err(e: std::io::Error) -> FatalError {
    FatalError::new(format!("write: {e}"))
}

fn verilog_name(name: &str) -> String {
    let plain = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain {
        name.to_string()
    } else {
        format!("\\{name} ")
    }
}

/// Writes `m` as BLIF.
pub fn write_blif(d: &Design, m: ModelId, w: &mut dyn Write) -> Result<()> {
    let model = d.model(m);

    writeln!(w, ".model {}", model.name).map_err(io_err)?;

    write!(w, ".inputs").map_err(io_err)?;
    for &p in &model.ports {
        let dir = d.port(p).dir;
        if dir == Direction::In || dir == Direction::Inout {
            write!(w, " {}", d.port(p).name).map_err(io_err)?;
        }
    }
    writeln!(w).map_err(io_err)?;

    write!(w, ".outputs").map_err(io_err)?;
    for &p in &model.ports {
        let dir = d.port(p).dir;
        if dir == Direction::Out || dir == Direction::Inout {
            write!(w, " {}", d.port(p).name).map_err(io_err)?;
        }
    }
    writeln!(w).map_err(io_err)?;

    let (net_name, _is_port) = d.shared_names(m);

    for (&n, name) in &net_name {
        if *name != d.net(n).name {
            writeln!(w, "# {} -> {}", d.net(n).name, name).map_err(io_err)?;
        }
    }

    for &n in &model.nets {
        let net = d.net(n);
        if net.is_constant {
            writeln!(w, ".names {}", net.name).map_err(io_err)?;
            match net.constant {
                Value::One => writeln!(w, "1").map_err(io_err)?,
                Value::Zero => {}
                _ => unreachable!("constant net is neither 0 nor 1"),
            }
        }
    }

    for &i in &model.instances {
        let inst = d.instance(i);
        write!(w, ".gate {}", d.model(inst.instance_of).name).map_err(io_err)?;
        for &p in &inst.ports {
            write!(w, " {}=", d.port(p).name).map_err(io_err)?;
            if let Some(n) = d.port(p).connection {
                write!(w, "{}", net_name[&n]).map_err(io_err)?;
            }
        }
        writeln!(w).map_err(io_err)?;
        for (name, value) in &inst.attrs {
            writeln!(w, ".attr {} {}", name, value.write_blif()).map_err(io_err)?;
        }
        for (name, value) in &inst.params {
            writeln!(w, ".param {} {}", name, value.write_blif()).map_err(io_err)?;
        }
    }

    // Buffers stitching differently named port nets to their port names.
    for &p in &model.ports {
        let port = d.port(p);
        if let Some(n) = port.connection {
            if d.net(n).name != port.name {
                if d.port_is_input(p) {
                    writeln!(w, ".names {} {}", net_name[&n], port.name).map_err(io_err)?;
                } else {
                    writeln!(w, ".names {} {}", port.name, net_name[&n]).map_err(io_err)?;
                }
                writeln!(w, "1 1").map_err(io_err)?;
            }
        }
    }

    writeln!(w, ".end").map_err(io_err)?;
    Ok(())
}

/// Writes `m` as structural Verilog.
pub fn write_verilog(d: &Design, m: ModelId, w: &mut dyn Write) -> Result<()> {
    let model = d.model(m);

    write!(w, "module {}(", verilog_name(&model.name)).map_err(io_err)?;
    for (k, &p) in model.ports.iter().enumerate() {
        if k > 0 {
            write!(w, ", ").map_err(io_err)?;
        }
        let port = d.port(p);
        let dir = match port.dir {
            Direction::In => "input ",
            Direction::Out => "output ",
            Direction::Inout => "inout ",
        };
        write!(w, "{}{}", dir, verilog_name(&port.name)).map_err(io_err)?;
    }
    writeln!(w, ");").map_err(io_err)?;

    let (net_name, is_port) = d.shared_names(m);

    for (&n, name) in &net_name {
        if *name != d.net(n).name {
            writeln!(w, "  // {} -> {}", d.net(n).name, name).map_err(io_err)?;
        }
    }

    for &n in &model.nets {
        if is_port.contains(&n) {
            continue;
        }
        let net = d.net(n);
        write!(w, "  wire {}", verilog_name(&net_name[&n])).map_err(io_err)?;
        if net.is_constant {
            match net.constant {
                Value::One => write!(w, " = 1").map_err(io_err)?,
                Value::Zero => write!(w, " = 0").map_err(io_err)?,
                _ => unreachable!("constant net is neither 0 nor 1"),
            }
        }
        writeln!(w, ";").map_err(io_err)?;
    }

    for &p in &model.ports {
        let port = d.port(p);
        if let Some(n) = port.connection {
            if d.net(n).name != port.name {
                if d.port_is_input(p) {
                    writeln!(
                        w,
                        "  assign {} = {};",
                        verilog_name(&net_name[&n]),
                        port.name
                    )
                    .map_err(io_err)?;
                } else {
                    writeln!(
                        w,
                        "  assign {} = {};",
                        port.name,
                        verilog_name(&net_name[&n])
                    )
                    .map_err(io_err)?;
                }
            }
        }
    }

    for (k, &i) in model.instances.iter().enumerate() {
        let inst = d.instance(i);
        if !inst.attrs.is_empty() {
            write!(w, "  (* ").map_err(io_err)?;
            for (j, (name, value)) in inst.attrs.iter().enumerate() {
                if j > 0 {
                    write!(w, ", ").map_err(io_err)?;
                }
                write!(w, "{}={}", name, value.write_verilog()).map_err(io_err)?;
            }
            writeln!(w, " *)").map_err(io_err)?;
        }

        write!(w, "  {}", verilog_name(&d.model(inst.instance_of).name)).map_err(io_err)?;
        if !inst.params.is_empty() {
            write!(w, " #(").map_err(io_err)?;
            for (j, (name, value)) in inst.params.iter().enumerate() {
                if j > 0 {
                    write!(w, ",").map_err(io_err)?;
                }
                write!(w, "\n    .{}({})", verilog_name(name), value.write_verilog())
                    .map_err(io_err)?;
            }
            write!(w, "\n  ) ").map_err(io_err)?;
        }
        write!(w, "$inst{k} (").map_err(io_err)?;
        let mut first = true;
        for &p in &inst.ports {
            let port = d.port(p);
            if let Some(n) = port.connection {
                if !first {
                    write!(w, ",").map_err(io_err)?;
                }
                first = false;
                write!(
                    w,
                    "\n    .{}({})",
                    verilog_name(&port.name),
                    verilog_name(&net_name[&n])
                )
                .map_err(io_err)?;
            }
        }
        writeln!(w, "\n  );").map_err(io_err)?;
    }

    writeln!(w, "endmodule").map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constant::Const;
    use crate::design::NodeRef;
    use crate::models::{create_standard_models, Models};

    fn dump_blif(d: &Design, m: ModelId) -> String {
        let mut buf = Vec::new();
        write_blif(d, m, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn dump_verilog(d: &Design, m: ModelId) -> String {
        let mut buf = Vec::new();
        write_verilog(d, m, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn lc_design() -> (Design, ModelId) {
        let mut d = Design::new();
        create_standard_models(&mut d).unwrap();
        let top = d.add_model("top").unwrap();
        d.set_top(top);
        let models = Models::new(&d);

        let p_a = d.add_port(NodeRef::Model(top), "a", Direction::In, Value::X);
        let p_y = d.add_port(NodeRef::Model(top), "y", Direction::Out, Value::X);
        let n_a = d.find_or_add_net(top, "a");
        let n_y = d.find_or_add_net(top, "y");
        d.connect(p_a, n_a);
        d.connect(p_y, n_y);

        let lc = d.add_instance(top, models.lc);
        let i0 = d.find_port(NodeRef::Instance(lc), "I0").unwrap();
        let o = d.find_port(NodeRef::Instance(lc), "O").unwrap();
        d.connect(i0, n_a);
        d.connect(o, n_y);
        d.set_param(lc, "LUT_INIT", Const::bits_of(2, 2));
        d.set_attr(lc, "src", Const::str("buf.v:3"));
        (d, top)
    }

    #[test]
    fn blif_has_model_header_and_gate() {
        let (d, top) = lc_design();
        let s = dump_blif(&d, top);
        assert!(s.starts_with(".model top\n"));
        assert!(s.contains(".inputs a\n"));
        assert!(s.contains(".outputs y\n"));
        assert!(s.contains(".gate ICESTORM_LC"));
        assert!(s.contains("I0=a"));
        assert!(s.contains("O=y"));
        assert!(s.contains(".param LUT_INIT 10\n"));
        assert!(s.contains(".attr src \"buf.v:3\"\n"));
        assert!(s.trim_end().ends_with(".end"));
    }

    #[test]
    fn blif_emits_constant_names() {
        let (mut d, top) = lc_design();
        let n = d.find_or_add_net(top, "$true");
        d.net_mut(n).is_constant = true;
        d.net_mut(n).constant = Value::One;
        // Give it a consumer so prune would keep it; the writer does not
        // care either way.
        let s = dump_blif(&d, top);
        assert!(s.contains(".names $true\n1\n"));
    }

    #[test]
    fn verilog_declares_wires_and_instance() {
        let (d, top) = lc_design();
        let s = dump_verilog(&d, top);
        assert!(s.starts_with("module top(input a, output y);"));
        assert!(s.contains("ICESTORM_LC"));
        assert!(s.contains(".LUT_INIT(2'b10)"));
        assert!(s.contains(".I0(a)"));
        assert!(s.contains("$inst0"));
        assert!(s.trim_end().ends_with("endmodule"));
    }

    #[test]
    fn verilog_escapes_odd_names() {
        assert_eq!(verilog_name("plain_name$2"), "plain_name$2");
        assert_eq!(verilog_name("odd.name[3]"), "\\odd.name[3] ");
    }

    #[test]
    fn unconnected_ports_render_empty_in_blif() {
        let (d, top) = lc_design();
        let s = dump_blif(&d, top);
        // The LC's unconnected pins show as bare `NAME=`.
        assert!(s.contains(" I1= "));
        assert!(s.contains(" CIN= "));
    }
}
