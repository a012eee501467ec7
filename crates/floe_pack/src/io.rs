//! IO instantiation: wrap every bare top-level port in an `SB_IO`.
//!
//! Ports already attached to a pad cell are left alone. Tri-state buffers
//! (`$_TBUF_`) driving an output or inout port dissolve into the IO cell's
//! output-enable path. The `PIN_TYPE` masks are the hardware encodings:
//! `000001` plain input, `011001` registered-bypass output, `101001`
//! tri-stated output.

use floe_common::{FatalError, Result};
use floe_netlist::{Const, Design, Direction, Models, NodeRef};

/// Synthesizes `SB_IO` instances for unwrapped top-level ports.
pub fn instantiate_io(d: &mut Design) -> Result<()> {
    let models = Models::new(d);
    let top = d.top();
    let io_model = models.io;
    let tbuf_model = models.tbuf;

    // A tbuf is only legal immediately behind a top-level output/inout.
    for &inst in &d.model(top).instances {
        if !models.is_tbuf(d, inst) {
            continue;
        }
        let y = d.find_port(NodeRef::Instance(inst), "Y").unwrap();
        let ok = d.connection_other_port(y).is_some_and(|q| {
            matches!(d.port(q).owner, NodeRef::Model(_))
                && matches!(d.port(q).dir, Direction::Out | Direction::Inout)
        });
        if !ok {
            return Err(FatalError::new(
                "$_TBUF_ gate must drive top-level output or inout port",
            ));
        }
    }

    let top_ports: Vec<_> = d.model(top).ports.clone();
    for p in top_ports {
        let q = d.connection_other_port(p);
        if let Some(q) = q {
            if let NodeRef::Instance(qi) = d.port(q).owner {
                let qname = d.port(q).name.as_str();
                if (models.is_io_family(d, qi) && qname == "PACKAGE_PIN")
                    || (models.is_pll(d, qi) && qname == "PACKAGEPIN")
                {
                    continue;
                }
            }
        }

        let n = d.port(p).connection;
        let p_name = d.port(p).name.clone();
        if let Some(n) = n {
            if d.net(n).name == p_name {
                // Free the port's name for the new pad net.
                d.rename_net(top, n, &p_name);
            }
        }

        let t = d.add_net(top, &p_name);
        d.connect(p, t);

        let io_inst = d.add_instance(top, io_model);
        let pkg_pin = d.find_port(NodeRef::Instance(io_inst), "PACKAGE_PIN").unwrap();
        d.connect(pkg_pin, t);

        match d.port(p).dir {
            Direction::In => {
                if let Some(n) = n {
                    let d_in = d.find_port(NodeRef::Instance(io_inst), "D_IN_0").unwrap();
                    d.connect(d_in, n);
                }
                d.set_param(io_inst, "PIN_TYPE", Const::bits_of(6, 0x01));
            }
            Direction::Out | Direction::Inout => {
                let tbuf = q.and_then(|q| match d.port(q).owner {
                    NodeRef::Instance(qi)
                        if d.instance(qi).instance_of == tbuf_model
                            && d.port(q).name == "Y" =>
                    {
                        Some(qi)
                    }
                    _ => None,
                });

                if let Some(tbuf) = tbuf {
                    let a = d.find_port(NodeRef::Instance(tbuf), "A").unwrap();
                    let e = d.find_port(NodeRef::Instance(tbuf), "E").unwrap();
                    let y = d.find_port(NodeRef::Instance(tbuf), "Y").unwrap();

                    for (io_port, tbuf_port) in
                        [("D_OUT_0", a), ("D_IN_0", y), ("OUTPUT_ENABLE", e)]
                    {
                        if let Some(net) = d.port(tbuf_port).connection {
                            let dst = d.find_port(NodeRef::Instance(io_inst), io_port).unwrap();
                            d.connect(dst, net);
                        }
                    }
                    d.set_param(io_inst, "PIN_TYPE", Const::bits_of(6, 0x29));
                    d.remove_instance(tbuf);
                } else {
                    if d.port(p).dir == Direction::Inout {
                        return Err(FatalError::new(format!(
                            "bidirectional port `{p_name}' must be driven by tri-state buffer"
                        )));
                    }
                    if let Some(n) = n {
                        let d_out =
                            d.find_port(NodeRef::Instance(io_inst), "D_OUT_0").unwrap();
                        d.connect(d_out, n);
                    }
                    d.set_param(io_inst, "PIN_TYPE", Const::bits_of(6, 0x19));
                }
            }
        }
    }

    d.prune();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_blif::parse_blif;

    #[test]
    fn input_port_gets_input_pin_type() {
        let mut d = parse_blif(
            "t",
            ".model top\n.inputs a\n.outputs y\n\
             .gate SB_LUT4 O=y I0=a\n.param LUT_INIT 10\n.end\n",
        )
        .unwrap();
        instantiate_io(&mut d).unwrap();
        let top = d.top();
        let models = Models::new(&d);
        let ios: Vec<_> = d
            .model(top)
            .instances
            .iter()
            .copied()
            .filter(|&i| models.is_io(&d, i))
            .collect();
        assert_eq!(ios.len(), 2);

        let pin_types: Vec<u64> = ios
            .iter()
            .map(|&i| {
                d.get_param(i, "PIN_TYPE")
                    .unwrap()
                    .as_bits()
                    .unwrap()
                    .low_u64()
            })
            .collect();
        assert!(pin_types.contains(&0x01));
        assert!(pin_types.contains(&0x19));
    }

    #[test]
    fn pad_net_keeps_port_name() {
        let mut d = parse_blif(
            "t",
            ".model top\n.inputs a\n.outputs y\n\
             .gate SB_LUT4 O=y I0=a\n.param LUT_INIT 10\n.end\n",
        )
        .unwrap();
        instantiate_io(&mut d).unwrap();
        let top = d.top();
        // The pad net carries the port name; the internal side was
        // renamed away.
        let a = d.find_net(top, "a").unwrap();
        let conns = &d.net(a).connections;
        assert!(conns
            .iter()
            .any(|&p| matches!(d.port(p).owner, NodeRef::Model(_))));
        assert!(d.find_net(top, "a$2").is_some());
    }

    #[test]
    fn tbuf_becomes_output_enable() {
        let mut d = parse_blif(
            "t",
            ".model top\n.inputs d e\n.outputs o\n\
             .gate $_TBUF_ A=d E=e Y=o\n.end\n",
        )
        .unwrap();
        instantiate_io(&mut d).unwrap();
        let top = d.top();
        let models = Models::new(&d);
        let insts: Vec<_> = d.model(top).instances.iter().copied().collect();
        // No tbuf survives; the o-side IO is tri-stated.
        assert!(insts.iter().all(|&i| !models.is_tbuf(&d, i)));
        let tri = insts
            .iter()
            .copied()
            .find(|&i| {
                models.is_io(&d, i)
                    && d.get_param(i, "PIN_TYPE")
                        .unwrap()
                        .as_bits()
                        .unwrap()
                        .low_u64()
                        == 0x29
            })
            .expect("no tri-state IO");
        let oe = d.find_port(NodeRef::Instance(tri), "OUTPUT_ENABLE").unwrap();
        assert!(d.port(oe).connection.is_some());
    }

    #[test]
    fn misplaced_tbuf_is_fatal() {
        let mut d = parse_blif(
            "t",
            ".model top\n.inputs d e a\n.outputs y\n\
             .gate $_TBUF_ A=d E=e Y=m\n\
             .gate SB_LUT4 O=y I0=m I1=a\n.param LUT_INIT 1000\n.end\n",
        )
        .unwrap();
        let err = instantiate_io(&mut d).unwrap_err();
        assert!(err
            .to_string()
            .contains("$_TBUF_ gate must drive top-level output or inout port"));
    }

    #[test]
    fn already_wrapped_port_is_left_alone() {
        let mut d = parse_blif(
            "t",
            ".model top\n.inputs pad\n.outputs y\n\
             .gate SB_IO PACKAGE_PIN=pad D_IN_0=din\n.param PIN_TYPE 000001\n\
             .gate SB_LUT4 O=y I0=din\n.param LUT_INIT 10\n.end\n",
        )
        .unwrap();
        instantiate_io(&mut d).unwrap();
        let top = d.top();
        let models = Models::new(&d);
        let n_io = d
            .model(top)
            .instances
            .iter()
            .filter(|&&i| models.is_io(&d, i))
            .count();
        // One pre-existing IO plus one synthesized for `y` only.
        assert_eq!(n_io, 2);
    }
}
