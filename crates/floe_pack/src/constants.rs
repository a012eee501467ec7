//! Constant realization: drive constant sinks from synthesized LCs.
//!
//! After packing and global promotion, any port still reading a constant
//! net gets rewired to the output of a `$false` (LUT_INIT = 0) or `$true`
//! (LUT_INIT = 1) LC, except where the hardware supplies the value
//! implicitly: an IO `PACKAGE_PIN`, an LC `CIN` (the carry-in mux has its
//! own constant inputs), or any port whose undriven default already
//! matches.

use floe_common::Result;
use floe_diagnostics::LogSink;
use floe_netlist::{Const, Design, Models, NetId, NodeRef, Value};

/// Realizes constants in the top model.
pub fn realize_constants(d: &mut Design, sink: &LogSink) -> Result<()> {
    let models = Models::new(d);
    let top = d.top();

    let mut const0: Option<NetId> = None;
    for &n in &d.model(top).nets {
        if d.net(n).is_constant && d.net(n).constant == Value::Zero {
            const0 = Some(n);
            break;
        }
    }

    let mut actual_const0: Option<NetId> = None;
    let mut actual_const1: Option<NetId> = None;

    let insts: Vec<_> = d.model(top).instances.iter().copied().collect();
    for inst in insts {
        let ports: Vec<_> = d.instance(inst).ports.clone();
        for p in ports {
            let name = d.port(p).name.clone();
            if (models.is_io(d, inst) && name == "PACKAGE_PIN")
                || (models.is_lc(d, inst) && name == "CIN")
            {
                continue;
            }
            let Some(n) = d.port(p).connection else {
                continue;
            };
            if !d.net(n).is_constant || d.net(n).constant == d.port(p).undriven {
                continue;
            }

            let v = d.net(n).constant;
            let new_n = match v {
                Value::Zero => {
                    if actual_const0.is_none() {
                        let net = d.add_net(top, "$false");
                        let lc = d.add_instance(top, models.lc);
                        let c0 = const0.expect("packing established a zero constant");
                        for input in ["I0", "I1", "I2", "I3"] {
                            let ip = d.find_port(NodeRef::Instance(lc), input).unwrap();
                            d.connect(ip, c0);
                        }
                        let o = d.find_port(NodeRef::Instance(lc), "O").unwrap();
                        d.connect(o, net);
                        d.set_param(lc, "LUT_INIT", Const::bits_of(1, 0));
                        actual_const0 = Some(net);
                    }
                    actual_const0.unwrap()
                }
                Value::One => {
                    if actual_const1.is_none() {
                        let net = d.add_net(top, "$true");
                        let lc = d.add_instance(top, models.lc);
                        let c0 = match const0 {
                            Some(c0) => c0,
                            None => {
                                let c0 = d.add_net(top, "$false");
                                d.net_mut(c0).is_constant = true;
                                d.net_mut(c0).constant = Value::Zero;
                                const0 = Some(c0);
                                c0
                            }
                        };
                        for input in ["I0", "I1", "I2", "I3"] {
                            let ip = d.find_port(NodeRef::Instance(lc), input).unwrap();
                            d.connect(ip, c0);
                        }
                        let o = d.find_port(NodeRef::Instance(lc), "O").unwrap();
                        d.connect(o, net);
                        d.set_param(lc, "LUT_INIT", Const::bits_of(16, 1));
                        actual_const1 = Some(net);
                    }
                    actual_const1.unwrap()
                }
                _ => continue,
            };

            d.connect(p, new_n);
            if d.net(n).connections.is_empty() {
                d.remove_net(top, n);
            }
        }
    }

    match (actual_const0.is_some(), actual_const1.is_some()) {
        (true, true) => sink.noteln("  realized 0, 1"),
        (true, false) => sink.noteln("  realized 0"),
        (false, true) => sink.noteln("  realized 1"),
        (false, false) => {}
    }
    Ok(())
}
