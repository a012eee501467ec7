//! BLIF netlist reader.
//!
//! Accepts the gate-level subset: `.model`, `.inputs`, `.outputs`,
//! `.names` (constant and buffer forms only), `.gate` with formal=actual
//! pairs, `.attr`, `.param` and `.end`. After parsing, buffer `.names`
//! are dissolved by net unification, `SB_IO_OD` instances are normalized
//! onto `SB_IO_OD_A`, and the structural entry conditions (inout ports on
//! pads, single drivers) are checked.

use floe_common::{BitVec, FatalError, Result};
use floe_diagnostics::LineReader;
use floe_netlist::models::create_standard_models;
use floe_netlist::{Const, Design, Direction, InstanceId, Models, NetId, NodeRef, Value};
use std::collections::BTreeMap;

/// Reads a BLIF file into a fresh design with the standard models.
pub fn read_blif(path: &str) -> Result<Design> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| FatalError::new(format!("read_blif: failed to open `{path}': {e}")))?;
    parse_blif(path, &text)
}

/// Parses BLIF text into a fresh design with the standard models.
pub fn parse_blif(file: &str, text: &str) -> Result<Design> {
    let mut d = Design::new();
    create_standard_models(&mut d)?;
    let mut p = Parser {
        r: LineReader::new(file, text),
        pending: false,
    };
    p.parse(&mut d)?;
    Ok(d)
}

struct Parser<'a> {
    r: LineReader<'a>,
    pending: bool,
}

impl<'a> Parser<'a> {
    fn advance(&mut self) -> Result<()> {
        if self.pending {
            self.pending = false;
        } else {
            self.r.read_line()?;
        }
        Ok(())
    }

    fn block_line(&mut self) -> Result<bool> {
        self.r.read_line()?;
        if self.r.eof() {
            return Ok(false);
        }
        if self.r.line.trim_start().starts_with('.') {
            self.pending = true;
            return Ok(false);
        }
        Ok(true)
    }

    fn bits_const(&self, w: &str) -> Result<Const> {
        match BitVec::parse_binary(w) {
            Some(bv) => Ok(Const::bits_at(self.r.pos.clone(), bv)),
            None => Err(self.r.fatal("invalid character in integer constant")),
        }
    }

    fn value_const(&self, w: &str) -> Result<Const> {
        if let Some(inner) = w.strip_prefix('"') {
            let inner = inner.strip_suffix('"').unwrap_or(inner);
            Ok(Const::str_at(self.r.pos.clone(), inner))
        } else {
            self.bits_const(w)
        }
    }

    fn parse(&mut self, d: &mut Design) -> Result<()> {
        let mut top = None;
        let mut unify: Vec<(NetId, NetId)> = Vec::new();
        let mut inst: Option<InstanceId> = None;

        'outer: loop {
            self.advance()?;
            if self.r.eof() {
                break;
            }
            let words = self.r.words.clone();
            let cmd = words[0].as_str();
            if !cmd.starts_with('.') {
                return Err(self.r.fatal("expected directive"));
            }

            match cmd {
                ".model" => {
                    if words.len() != 2 {
                        return Err(self.r.fatal(format!(
                            "invalid .model directive: expected exactly 1 argument, got {}",
                            words.len() - 1
                        )));
                    }
                    if top.is_some() {
                        return Err(self
                            .r
                            .fatal("definition of multiple models is not supported"));
                    }
                    let m = d.add_model(&words[1])?;
                    d.set_top(m);
                    top = Some(m);
                }
                ".inputs" | ".outputs" => {
                    let Some(top) = top else {
                        return Err(self
                            .r
                            .fatal(format!("{cmd} directive outside of model definition")));
                    };
                    let declared = if cmd == ".inputs" {
                        Direction::In
                    } else {
                        Direction::Out
                    };
                    for name in &words[1..] {
                        let port = match d.find_port(NodeRef::Model(top), name) {
                            Some(p) => {
                                if d.port(p).dir == declared.opposite() {
                                    d.set_port_dir(p, Direction::Inout);
                                }
                                p
                            }
                            None => d.add_port(NodeRef::Model(top), name, declared, Value::X),
                        };
                        let net = d.find_or_add_net(top, name);
                        d.connect(port, net);
                    }
                }
                ".names" => {
                    let Some(top) = top else {
                        return Err(self.r.fatal(".names directive outside of model definition"));
                    };
                    let names_pos = self.r.pos.clone();
                    let n = words.len();

                    let mut names_net = None;
                    match n {
                        2 => {
                            let net = d.find_or_add_net(top, &words[1]);
                            d.net_mut(net).is_constant = true;
                            d.net_mut(net).constant = Value::Zero;
                            names_net = Some(net);
                        }
                        3 => {
                            let n1 = d.find_or_add_net(top, &words[1]);
                            let n2 = d.find_or_add_net(top, &words[2]);
                            unify.push((n1, n2));
                        }
                        _ => {
                            return Err(self.r.fatal(format!(
                                "invalid .names directive: expected 1 or 2 arguments, got {}",
                                n - 1
                            )))
                        }
                    }

                    let mut saw11 = false;
                    loop {
                        if !self.block_line()? {
                            if n == 3 && !saw11 {
                                let what = if self.r.eof() {
                                    "unexpected end of file"
                                } else {
                                    ".names entry expected"
                                };
                                return Err(
                                    names_pos.fatal(format!("invalid .names directive: {what}"))
                                );
                            }
                            continue 'outer;
                        }
                        if self.r.words.len() != n - 1 {
                            return Err(self.r.fatal(
                                "invalid .names entry: number of gates does not match \
                                 specified number of nets",
                            ));
                        }
                        if n == 2 {
                            match self.r.words[0].as_str() {
                                "1" => d.net_mut(names_net.unwrap()).constant = Value::One,
                                "0" => {}
                                _ => {
                                    return Err(self
                                        .r
                                        .fatal("invalid .names entry: gate must be either 1 or 0"))
                                }
                            }
                        } else {
                            if self.r.words[0] != "1" || self.r.words[1] != "1" {
                                return Err(self
                                    .r
                                    .fatal("invalid .names entry: both gates must be 1 here"));
                            }
                            saw11 = true;
                        }
                    }
                }
                ".gate" => {
                    let Some(top) = top else {
                        return Err(self.r.fatal(".gate directive outside of model definition"));
                    };
                    if words.len() < 2 {
                        return Err(self.r.fatal("invalid .gate directive: missing name"));
                    }
                    let Some(inst_of) = d.find_model(&words[1]) else {
                        return Err(self.r.fatal(format!("unknown model `{}'", words[1])));
                    };
                    let i = d.add_instance(top, inst_of);
                    inst = Some(i);

                    for w in &words[2..] {
                        let Some(eq) = w.find('=') else {
                            return Err(self.r.fatal("invalid formal-actual"));
                        };
                        let (formal, actual) = (&w[..eq], &w[eq + 1..]);
                        if actual.is_empty() {
                            continue;
                        }
                        let Some(port) = d.find_port(NodeRef::Instance(i), formal) else {
                            return Err(self.r.fatal(format!("unknown formal `{formal}'")));
                        };
                        let net = d.find_or_add_net(top, actual);
                        d.connect(port, net);
                    }
                }
                ".attr" | ".param" => {
                    if words.len() != 3 {
                        return Err(self.r.fatal(format!(
                            "invalid {cmd} directive: expected exactly 2 arguments, got {}",
                            words.len() - 1
                        )));
                    }
                    let Some(i) = inst else {
                        return Err(self.r.fatal(format!("no gate for {cmd} directive")));
                    };
                    let value = self.value_const(&words[2])?;
                    if cmd == ".attr" {
                        d.set_attr(i, &words[1], value);
                    } else {
                        d.set_param(i, &words[1], value);
                    }
                }
                ".end" => {
                    if top.is_none() {
                        return Err(self.r.fatal(".end directive outside of model definition"));
                    }
                    break;
                }
                _ => return Err(self.r.fatal(format!("unknown directive '{cmd}'"))),
            }
        }

        let Some(top) = top else {
            return Err(FatalError::new("no top model has been defined"));
        };

        self.resolve_unify(d, top, unify)?;
        normalize_io_od(d, top)?;
        check_entry_conditions(d, top)?;
        Ok(())
    }

    /// Dissolves buffer `.names`: each `(n1, n2)` pair merges `n2` into
    /// the representative of `n1`'s chain.
    fn resolve_unify(
        &self,
        d: &mut Design,
        top: floe_netlist::ModelId,
        unify: Vec<(NetId, NetId)>,
    ) -> Result<()> {
        let mut replacement: BTreeMap<NetId, NetId> = BTreeMap::new();
        for (n1, n2) in unify {
            let mut r = n1;
            while let Some(&t) = replacement.get(&r) {
                r = t;
            }
            // Path-compress the chain behind n1.
            let mut x = n1;
            while x != r {
                let next = replacement[&x];
                replacement.insert(x, r);
                x = next;
            }

            if n2 == r {
                return Err(FatalError::new(".names cycle"));
            }
            d.replace_net(n2, r);
            if replacement.contains_key(&n2) {
                return Err(FatalError::new("conflicting .names outputs"));
            }
            replacement.insert(n2, r);
        }
        for &n in replacement.keys() {
            d.remove_net(top, n);
        }
        Ok(())
    }
}

/// Rewrites `SB_IO_OD` instances onto the normalized `SB_IO_OD_A` model.
fn normalize_io_od(d: &mut Design, top: floe_netlist::ModelId) -> Result<()> {
    let od_model = d.find_model("SB_IO_OD").unwrap();
    let od_a_model = d.find_model("SB_IO_OD_A").unwrap();

    let targets: Vec<InstanceId> = d
        .model(top)
        .instances
        .iter()
        .copied()
        .filter(|&i| d.instance(i).instance_of == od_model)
        .collect();

    for od in targets {
        let od_a = d.add_instance(top, od_a_model);
        let ports: Vec<_> = d.instance(od_a).ports.clone();
        for p in ports {
            let name = d.port(p).name.clone();
            let sb_name: String = name.chars().filter(|&c| c != '_').collect();
            let od_port = d
                .find_port(NodeRef::Instance(od), &sb_name)
                .expect("SB_IO_OD port set mismatch");
            if let Some(n) = d.port(od_port).connection {
                d.connect(p, n);
            }
        }
        let param_names: Vec<String> = d.model(od_a_model).params.keys().cloned().collect();
        for name in param_names {
            if d.has_param(od, &name) {
                let value = d.get_param(od, &name)?.clone();
                d.set_param(od_a, &name, value);
            }
        }
        d.remove_instance(od);
    }
    Ok(())
}

/// Entry conditions: inout top ports sit on pads, pads sit on top ports,
/// and no non-boundary net has two drivers.
fn check_entry_conditions(d: &Design, top: floe_netlist::ModelId) -> Result<()> {
    let models = Models::new(d);

    for &p in &d.model(top).ports {
        if !d.port_is_bidir(p) || d.port(p).connection.is_none() {
            continue;
        }
        let ok = d.connection_other_port(p).is_some_and(|q| {
            matches!(d.port(q).owner, NodeRef::Instance(qi)
                if (d.instance(qi).instance_of == models.io
                    || d.instance(qi).instance_of == models.io_i3c
                    || d.instance(qi).instance_of == models.io_od)
                    && d.port(q).name == "PACKAGE_PIN")
        });
        if !ok {
            return Err(FatalError::new(format!(
                "toplevel inout port '{}' not connected to SB_IO PACKAGE_PIN",
                d.port(p).name
            )));
        }
    }

    let mut boundary = std::collections::BTreeSet::new();
    for &i in &d.model(top).instances {
        if d.instance(i).instance_of != models.io {
            continue;
        }
        let p = d.find_port(NodeRef::Instance(i), "PACKAGE_PIN").unwrap();
        let n = d.port(p).connection;
        let q = d.connection_other_port(p);
        let on_top_port =
            q.is_some_and(|q| matches!(d.port(q).owner, NodeRef::Model(m) if m == top));
        if n.is_none() || !on_top_port {
            return Err(FatalError::new(
                "SB_IO PACKAGE_PIN not connected to toplevel port",
            ));
        }
        boundary.insert(n.unwrap());
    }

    for &n in &d.model(top).nets {
        if boundary.contains(&n) {
            continue;
        }
        let net = d.net(n);
        let mut n_drivers = usize::from(net.is_constant);
        for &p in &net.connections {
            if d.port_is_output(p) {
                n_drivers += 1;
            }
        }
        if n_drivers > 1 {
            return Err(FatalError::new(format!(
                "net `{}' has multiple drivers",
                net.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_buffer_parses() {
        let d = parse_blif("t", ".model top\n.inputs a\n.outputs b\n.names a b\n1 1\n.end\n")
            .unwrap();
        let top = d.top();
        assert_eq!(d.model(top).name, "top");
        // The buffer dissolves: a single net remains, connected to both
        // ports.
        let a = d.find_net(top, "a").unwrap();
        assert_eq!(d.find_net(top, "b"), None);
        assert_eq!(d.net(a).connections.len(), 2);
    }

    #[test]
    fn constant_names() {
        let d = parse_blif("t", ".model top\n.outputs o\n.names c\n1\n.names c o\n1 1\n.end\n")
            .unwrap();
        let top = d.top();
        let c = d.find_net(top, "c").unwrap();
        assert!(d.net(c).is_constant);
        assert_eq!(d.net(c).constant, Value::One);
    }

    #[test]
    fn zero_constant_without_body() {
        let d = parse_blif("t", ".model top\n.names z\n.end\n").unwrap();
        let top = d.top();
        let z = d.find_net(top, "z").unwrap();
        assert!(d.net(z).is_constant);
        assert_eq!(d.net(z).constant, Value::Zero);
    }

    #[test]
    fn gate_with_params_and_attrs() {
        let d = parse_blif(
            "t",
            ".model top\n.inputs a b\n.outputs q\n\
             .gate SB_LUT4 O=q I0=a I1=b I2= I3=\n\
             .param LUT_INIT 1000\n.attr src \"and.v:7\"\n.end\n",
        )
        .unwrap();
        let top = d.top();
        let i = *d.model(top).instances.iter().next().unwrap();
        assert_eq!(d.model(d.instance(i).instance_of).name, "SB_LUT4");
        let init = d.get_param(i, "LUT_INIT").unwrap();
        assert_eq!(init.as_bits().unwrap().low_u64(), 0b1000);
        assert_eq!(d.get_attr(i, "src").unwrap().as_string().unwrap(), "and.v:7");
        let i2 = d.find_port(NodeRef::Instance(i), "I2").unwrap();
        assert_eq!(d.port(i2).connection, None);
    }

    #[test]
    fn unknown_model_is_fatal() {
        let err = parse_blif("t", ".model top\n.gate SB_NOPE O=x\n.end\n").unwrap_err();
        assert!(err.to_string().contains("unknown model `SB_NOPE'"));
    }

    #[test]
    fn names_cycle_detected() {
        let err = parse_blif(
            "t",
            ".model top\n.names a b\n1 1\n.names b a\n1 1\n.end\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains(".names cycle"));
    }

    #[test]
    fn chained_unify_keeps_representative() {
        let d = parse_blif(
            "t",
            ".model top\n.inputs a\n.outputs c\n.names a b\n1 1\n.names b c\n1 1\n.end\n",
        )
        .unwrap();
        let top = d.top();
        assert!(d.find_net(top, "a").is_some());
        assert_eq!(d.find_net(top, "b"), None);
        assert_eq!(d.find_net(top, "c"), None);
    }

    #[test]
    fn multiple_drivers_detected() {
        let err = parse_blif(
            "t",
            ".model top\n.inputs a b\n.outputs o\n\
             .gate SB_LUT4 O=o I0=a\n.gate SB_LUT4 O=o I0=b\n.end\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("multiple drivers"));
    }

    #[test]
    fn inout_requires_package_pin() {
        let err = parse_blif(
            "t",
            ".model top\n.inputs x\n.outputs x\n\
             .gate SB_LUT4 O=x I0=\n.end\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("not connected to SB_IO PACKAGE_PIN"));
    }

    #[test]
    fn io_od_rewrite_moves_connections() {
        let d = parse_blif(
            "t",
            ".model top\n.inputs d\n\
             .gate SB_IO_OD PACKAGEPIN= DOUT0=d\n\
             .param NEG_TRIGGER 1\n.end\n",
        )
        .unwrap();
        let top = d.top();
        let insts: Vec<_> = d.model(top).instances.iter().copied().collect();
        assert_eq!(insts.len(), 1);
        let i = insts[0];
        assert_eq!(d.model(d.instance(i).instance_of).name, "SB_IO_OD_A");
        let dout = d.find_port(NodeRef::Instance(i), "D_OUT_0").unwrap();
        let n = d.port(dout).connection.unwrap();
        assert_eq!(d.net(n).name, "d");
        assert!(d.get_param(i, "NEG_TRIGGER").unwrap().get_bit(0).unwrap());
    }

    #[test]
    fn line_continuation_in_inputs() {
        let d = parse_blif("t", ".model top\n.inputs a \\\nb c\n.end\n").unwrap();
        let top = d.top();
        assert_eq!(d.model(top).ports.len(), 3);
    }

    #[test]
    fn port_in_both_directions_becomes_inout() {
        let err = parse_blif("t", ".model top\n.inputs x\n.outputs x\n.end\n").unwrap_err();
        // x becomes INOUT and, being unconnected to a pad... it is
        // connected to net x with no pad: boundary check fires.
        assert!(err.to_string().contains("inout port"));
    }
}
