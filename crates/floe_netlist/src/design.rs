//! The arena-backed netlist.
//!
//! All entities live in flat arenas on the [`Design`]; models, instances
//! and nets reference each other by id. Removed entities leave dead slots
//! so ids stay stable for the life of the design. Member sets
//! (`Model::instances`, `Model::nets`, `Net::connections`) are id-ordered
//! `BTreeSet`s, so iteration is creation order.

use crate::constant::{Const, Value};
use crate::ids::{InstanceId, ModelId, NetId, PortId};
use floe_common::{fatal, BasedVec, BitVec, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Port direction as declared.
///
/// Viewed from inside a model body the meaning flips: a model's IN port
/// drives the body, its OUT port consumes from it. [`Design::port_is_output`]
/// and [`Design::port_is_input`] apply the flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input.
    In,
    /// Output.
    Out,
    /// Bidirectional.
    Inout,
}

impl Direction {
    /// The direction seen from the other side of the boundary.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
            Direction::Inout => Direction::Inout,
        }
    }
}

/// The owner of a port: a model (its boundary) or an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    /// A model boundary port.
    Model(ModelId),
    /// An instance port.
    Instance(InstanceId),
}

/// A named connection point on a model or instance.
#[derive(Debug)]
pub struct Port {
    /// Owning node.
    pub owner: NodeRef,
    /// Port name.
    pub name: String,
    /// Declared direction.
    pub dir: Direction,
    /// Value assumed when the port is left unconnected.
    pub undriven: Value,
    /// The connected net, if any.
    pub connection: Option<NetId>,
}

/// A hyperedge over ports, optionally carrying a constant value.
#[derive(Debug)]
pub struct Net {
    /// Name, unique within the owning model.
    pub name: String,
    /// Whether the net carries a constant.
    pub is_constant: bool,
    /// The constant value (meaningful when `is_constant`).
    pub constant: Value,
    /// Connected ports, in id (creation) order.
    pub connections: BTreeSet<PortId>,
}

/// An instantiation of a model inside another model.
#[derive(Debug)]
pub struct Instance {
    /// The model containing this instance.
    pub parent: ModelId,
    /// The instantiated model.
    pub instance_of: ModelId,
    /// Ports, in declaration order (copied from the instantiated model).
    pub ports: Vec<PortId>,
    /// Port name lookup.
    pub port_name: HashMap<String, PortId>,
    /// Instance parameters overriding the model defaults.
    pub params: BTreeMap<String, Const>,
    /// Attributes (`src`, `loc`, ...).
    pub attrs: BTreeMap<String, Const>,
}

/// A cell type or the top module.
#[derive(Debug)]
pub struct Model {
    /// Model name.
    pub name: String,
    /// Boundary ports in declaration order.
    pub ports: Vec<PortId>,
    /// Port name lookup.
    pub port_name: HashMap<String, PortId>,
    /// Nets, id-ordered.
    pub nets: BTreeSet<NetId>,
    /// Net name lookup.
    pub net_name: HashMap<String, NetId>,
    /// Instances, id-ordered.
    pub instances: BTreeSet<InstanceId>,
    /// Default parameter values.
    pub params: BTreeMap<String, Const>,
}

/// The whole design: a name-to-model table and a distinguished top model,
/// plus the arenas backing every entity.
#[derive(Debug, Default)]
pub struct Design {
    models: Vec<Model>,
    model_name: HashMap<String, ModelId>,
    instances: Vec<Option<Instance>>,
    ports: Vec<Option<Port>>,
    nets: Vec<Option<Net>>,
    top: Option<ModelId>,
    temp_counter: u32,
}

impl Design {
    /// Creates an empty design.
    pub fn new() -> Self {
        Self::default()
    }

    // ----- models -----

    /// Adds a model; the name must be unused.
    pub fn add_model(&mut self, name: impl Into<String>) -> Result<ModelId> {
        let name = name.into();
        if self.model_name.contains_key(&name) {
            fatal!("model name \"{name}\" conflicts with another defined model");
        }
        let id = ModelId::from_raw(self.models.len() as u32);
        self.models.push(Model {
            name: name.clone(),
            ports: Vec::new(),
            port_name: HashMap::new(),
            nets: BTreeSet::new(),
            net_name: HashMap::new(),
            instances: BTreeSet::new(),
            params: BTreeMap::new(),
        });
        self.model_name.insert(name, id);
        Ok(id)
    }

    /// Looks a model up by name.
    pub fn find_model(&self, name: &str) -> Option<ModelId> {
        self.model_name.get(name).copied()
    }

    /// The model with id `m`.
    pub fn model(&self, m: ModelId) -> &Model {
        &self.models[m.as_raw() as usize]
    }

    fn model_mut(&mut self, m: ModelId) -> &mut Model {
        &mut self.models[m.as_raw() as usize]
    }

    /// All models in creation order.
    pub fn models(&self) -> impl Iterator<Item = ModelId> + '_ {
        (0..self.models.len()).map(|i| ModelId::from_raw(i as u32))
    }

    /// Sets the top model; may be set only once.
    pub fn set_top(&mut self, m: ModelId) {
        assert!(self.top.is_none());
        self.top = Some(m);
    }

    /// The top model.
    ///
    /// # Panics
    ///
    /// Panics if no top model has been set.
    pub fn top(&self) -> ModelId {
        self.top.expect("no top model")
    }

    // ----- ports -----

    /// Adds a port to a node.
    pub fn add_port(
        &mut self,
        owner: NodeRef,
        name: impl Into<String>,
        dir: Direction,
        undriven: Value,
    ) -> PortId {
        let name = name.into();
        let id = PortId::from_raw(self.ports.len() as u32);
        self.ports.push(Some(Port {
            owner,
            name: name.clone(),
            dir,
            undriven,
            connection: None,
        }));
        match owner {
            NodeRef::Model(m) => {
                let model = self.model_mut(m);
                model.ports.push(id);
                model.port_name.insert(name, id);
            }
            NodeRef::Instance(i) => {
                let inst = self.instance_mut(i);
                inst.ports.push(id);
                inst.port_name.insert(name, id);
            }
        }
        id
    }

    /// The port with id `p`.
    pub fn port(&self, p: PortId) -> &Port {
        self.ports[p.as_raw() as usize].as_ref().expect("dead port")
    }

    fn port_mut(&mut self, p: PortId) -> &mut Port {
        self.ports[p.as_raw() as usize].as_mut().expect("dead port")
    }

    /// Finds a named port on a node.
    pub fn find_port(&self, node: NodeRef, name: &str) -> Option<PortId> {
        match node {
            NodeRef::Model(m) => self.model(m).port_name.get(name).copied(),
            NodeRef::Instance(i) => self.instance(i).port_name.get(name).copied(),
        }
    }

    /// Whether the port drives its net (flipped for model boundary ports).
    pub fn port_is_output(&self, p: PortId) -> bool {
        let port = self.port(p);
        match port.owner {
            NodeRef::Instance(_) => port.dir == Direction::Out,
            NodeRef::Model(_) => port.dir == Direction::In,
        }
    }

    /// Whether the port consumes its net (flipped for model boundary ports).
    pub fn port_is_input(&self, p: PortId) -> bool {
        let port = self.port(p);
        match port.owner {
            NodeRef::Instance(_) => port.dir == Direction::In,
            NodeRef::Model(_) => port.dir == Direction::Out,
        }
    }

    /// Whether the port is bidirectional.
    pub fn port_is_bidir(&self, p: PortId) -> bool {
        self.port(p).dir == Direction::Inout
    }

    /// Changes a port's declared direction (a top-level port listed under
    /// both `.inputs` and `.outputs` becomes inout).
    pub fn set_port_dir(&mut self, p: PortId, dir: Direction) {
        self.port_mut(p).dir = dir;
    }

    /// Connects `p` to `n`, disconnecting any prior net first.
    pub fn connect(&mut self, p: PortId, n: NetId) {
        self.disconnect(p);
        self.port_mut(p).connection = Some(n);
        self.net_mut(n).connections.insert(p);
    }

    /// Disconnects `p` from its net, if connected.
    pub fn disconnect(&mut self, p: PortId) {
        if let Some(n) = self.port_mut(p).connection.take() {
            self.net_mut(n).connections.remove(&p);
        }
    }

    /// If the port's net has exactly two connections, the other one.
    pub fn connection_other_port(&self, p: PortId) -> Option<PortId> {
        let n = self.port(p).connection?;
        let conns = &self.net(n).connections;
        if conns.len() != 2 {
            return None;
        }
        conns.iter().copied().find(|&q| q != p)
    }

    // ----- nets -----

    /// The net with id `n`.
    pub fn net(&self, n: NetId) -> &Net {
        self.nets[n.as_raw() as usize].as_ref().expect("dead net")
    }

    /// Mutable access to a net.
    pub fn net_mut(&mut self, n: NetId) -> &mut Net {
        self.nets[n.as_raw() as usize].as_mut().expect("dead net")
    }

    fn new_net(&mut self, m: ModelId, name: String) -> NetId {
        let id = NetId::from_raw(self.nets.len() as u32);
        self.nets.push(Some(Net {
            name: name.clone(),
            is_constant: false,
            constant: Value::X,
            connections: BTreeSet::new(),
        }));
        let model = self.model_mut(m);
        model.nets.insert(id);
        model.net_name.insert(name, id);
        id
    }

    /// Finds a net by name in `m`.
    pub fn find_net(&self, m: ModelId, name: &str) -> Option<NetId> {
        self.model(m).net_name.get(name).copied()
    }

    /// Finds or creates the net named `name` in `m`.
    pub fn find_or_add_net(&mut self, m: ModelId, name: &str) -> NetId {
        assert!(!name.is_empty());
        match self.find_net(m, name) {
            Some(n) => n,
            None => self.new_net(m, name.to_string()),
        }
    }

    /// Adds a net named `hint`, or `hint$k` for the smallest free `k >= 2`.
    pub fn add_net(&mut self, m: ModelId, hint: &str) -> NetId {
        let mut name = hint.to_string();
        let mut k = 2;
        while self.model(m).net_name.contains_key(&name) {
            name = format!("{hint}${k}");
            k += 1;
        }
        self.new_net(m, name)
    }

    /// Adds a net named like `orig`, deduplicated with a `$k` suffix.
    pub fn add_net_like(&mut self, m: ModelId, orig: NetId) -> NetId {
        let hint = self.net(orig).name.clone();
        self.add_net(m, &hint)
    }

    /// Adds an anonymous `$temp$<k>` net.
    pub fn add_temp_net(&mut self, m: ModelId) -> NetId {
        loop {
            let name = format!("$temp${}", self.temp_counter);
            self.temp_counter += 1;
            if !self.model(m).net_name.contains_key(&name) {
                return self.new_net(m, name);
            }
        }
    }

    /// Removes an unconnected net from `m`.
    pub fn remove_net(&mut self, m: ModelId, n: NetId) {
        assert!(self.net(n).connections.is_empty());
        let name = self.net(n).name.clone();
        let model = self.model_mut(m);
        model.nets.remove(&n);
        model.net_name.remove(&name);
        self.nets[n.as_raw() as usize] = None;
    }

    /// Renames `n` to `new_name`, probing `$k` suffixes past collisions
    /// (including a collision with the current name).
    pub fn rename_net(&mut self, m: ModelId, n: NetId, new_name: &str) {
        let old_name = self.net(n).name.clone();
        let mut name = new_name.to_string();
        let mut k = 2;
        while self.model(m).net_name.contains_key(&name) || name == old_name {
            name = format!("{new_name}${k}");
            k += 1;
        }
        let model = self.model_mut(m);
        model.net_name.remove(&old_name);
        model.net_name.insert(name.clone(), n);
        self.net_mut(n).name = name;
    }

    /// Rewires every connection of `n` onto `new_n`, leaving `n` empty.
    pub fn replace_net(&mut self, n: NetId, new_n: NetId) {
        assert_ne!(n, new_n);
        let conns: Vec<PortId> = self.net(n).connections.iter().copied().collect();
        for p in conns {
            self.connect(p, new_n);
        }
        debug_assert!(self.net(n).connections.is_empty());
    }

    // ----- instances -----

    /// The instance with id `i`.
    pub fn instance(&self, i: InstanceId) -> &Instance {
        self.instances[i.as_raw() as usize]
            .as_ref()
            .expect("dead instance")
    }

    fn instance_mut(&mut self, i: InstanceId) -> &mut Instance {
        self.instances[i.as_raw() as usize]
            .as_mut()
            .expect("dead instance")
    }

    /// Instantiates `inst_of` inside `parent`, copying its port list.
    pub fn add_instance(&mut self, parent: ModelId, inst_of: ModelId) -> InstanceId {
        let id = InstanceId::from_raw(self.instances.len() as u32);
        self.instances.push(Some(Instance {
            parent,
            instance_of: inst_of,
            ports: Vec::new(),
            port_name: HashMap::new(),
            params: BTreeMap::new(),
            attrs: BTreeMap::new(),
        }));
        let model_ports: Vec<PortId> = self.model(inst_of).ports.clone();
        for p in model_ports {
            let (name, dir, undriven) = {
                let port = self.port(p);
                (port.name.clone(), port.dir, port.undriven)
            };
            self.add_port(NodeRef::Instance(id), name, dir, undriven);
        }
        self.model_mut(parent).instances.insert(id);
        id
    }

    /// Disconnects and discards an instance (and its ports).
    pub fn remove_instance(&mut self, i: InstanceId) {
        let ports = self.instance(i).ports.clone();
        for p in &ports {
            self.disconnect(*p);
        }
        let parent = self.instance(i).parent;
        self.model_mut(parent).instances.remove(&i);
        for p in ports {
            self.ports[p.as_raw() as usize] = None;
        }
        self.instances[i.as_raw() as usize] = None;
    }

    // ----- parameters and attributes -----

    /// Sets a model's default parameter.
    pub fn set_model_param(&mut self, m: ModelId, name: &str, value: Const) {
        self.model_mut(m).params.insert(name.to_string(), value);
    }

    /// Sets an instance parameter.
    pub fn set_param(&mut self, i: InstanceId, name: &str, value: Const) {
        self.instance_mut(i).params.insert(name.to_string(), value);
    }

    /// Whether the instance (or its model defaults) has the parameter.
    pub fn has_param(&self, i: InstanceId, name: &str) -> bool {
        let inst = self.instance(i);
        inst.params.contains_key(name) || self.model(inst.instance_of).params.contains_key(name)
    }

    /// The instance parameter, falling back to the model default.
    pub fn get_param(&self, i: InstanceId, name: &str) -> Result<&Const> {
        let inst = self.instance(i);
        if let Some(c) = inst.params.get(name) {
            return Ok(c);
        }
        match self.model(inst.instance_of).params.get(name) {
            Some(c) => Ok(c),
            None => {
                fatal!(
                    "instance of `{}' has no parameter `{name}'",
                    self.model(inst.instance_of).name
                )
            }
        }
    }

    /// Whether the instance itself overrides the parameter.
    pub fn self_has_param(&self, i: InstanceId, name: &str) -> bool {
        self.instance(i).params.contains_key(name)
    }

    /// The instance's own parameter value.
    pub fn self_get_param(&self, i: InstanceId, name: &str) -> &Const {
        &self.instance(i).params[name]
    }

    /// Sets an attribute.
    pub fn set_attr(&mut self, i: InstanceId, name: &str, value: Const) {
        self.instance_mut(i).attrs.insert(name.to_string(), value);
    }

    /// Whether the instance has the attribute.
    pub fn has_attr(&self, i: InstanceId, name: &str) -> bool {
        self.instance(i).attrs.contains_key(name)
    }

    /// The attribute value.
    pub fn get_attr(&self, i: InstanceId, name: &str) -> Result<&Const> {
        match self.instance(i).attrs.get(name) {
            Some(c) => Ok(c),
            None => fatal!("instance has no attribute `{name}'"),
        }
    }

    /// Whether a one-bit attribute is present and set.
    pub fn is_attr_set(&self, i: InstanceId, name: &str) -> bool {
        self.instance(i)
            .attrs
            .get(name)
            .and_then(|c| c.get_bit(0).ok())
            .unwrap_or(false)
    }

    /// Folds `other`'s `src` attribute into `i`, `|`-concatenated.
    pub fn merge_attrs(&mut self, i: InstanceId, other: InstanceId) {
        let Some(other_src) = self.instance(other).attrs.get("src").cloned() else {
            return;
        };
        let merged = match self.instance(i).attrs.get("src") {
            Some(own) => {
                let own = own.as_string().unwrap_or_default().to_string();
                let add = other_src.as_string().unwrap_or_default();
                Const::str(format!("{own}|{add}"))
            }
            None => other_src,
        };
        self.set_attr(i, "src", merged);
    }

    // ----- whole-model operations -----

    /// Removes nets with fewer than two distinct endpoints or lacking a
    /// driver or a consumer. A constant counts as a driver and as an
    /// endpoint.
    pub fn prune_model(&mut self, m: ModelId) {
        let nets: Vec<NetId> = self.model(m).nets.iter().copied().collect();
        for n in nets {
            let net = self.net(n);
            let mut n_distinct = net.connections.len();
            let mut driver = net.is_constant;
            let mut input = false;
            if net.is_constant {
                n_distinct += 1;
            }
            for &p in &net.connections {
                if self.port_is_input(p) || self.port_is_bidir(p) {
                    input = true;
                }
                if self.port_is_output(p) || self.port_is_bidir(p) {
                    driver = true;
                }
            }
            if input && driver && n_distinct > 1 {
                continue;
            }
            let conns: Vec<PortId> = self.net(n).connections.iter().copied().collect();
            for p in conns {
                self.disconnect(p);
            }
            self.remove_net(m, n);
        }
    }

    /// Prunes every model.
    pub fn prune(&mut self) {
        let models: Vec<ModelId> = self.models().collect();
        for m in models {
            self.prune_model(m);
        }
    }

    /// Nets of the top model attached to a chip pad (`PACKAGE_PIN` of an
    /// IO-family instance, `PACKAGEPIN` of a PLL, or an RGB driver output).
    /// These are outside the routing fabric.
    pub fn boundary_nets(&self, models: &crate::models::Models) -> BTreeSet<NetId> {
        let top = self.top();
        let mut bnets = BTreeSet::new();
        for &p in &self.model(top).ports {
            let Some(n) = self.port(p).connection else {
                continue;
            };
            let Some(q) = self.connection_other_port(p) else {
                continue;
            };
            let NodeRef::Instance(inst) = self.port(q).owner else {
                continue;
            };
            let qname = self.port(q).name.as_str();
            if (models.is_io_family(self, inst) && qname == "PACKAGE_PIN")
                || (models.is_pll(self, inst) && qname == "PACKAGEPIN")
                || (models.is_rgba_drv(self, inst)
                    && matches!(qname, "RGB0" | "RGB1" | "RGB2"))
            {
                bnets.insert(n);
            }
        }
        bnets
    }

    /// Indexes the nets of `m`: a 1-based dense numbering in creation
    /// order, with index 0 reserved for "no net".
    pub fn index_nets(&self, m: ModelId) -> (Vec<Option<NetId>>, BTreeMap<NetId, usize>) {
        let mut nets: Vec<Option<NetId>> = vec![None];
        let mut net_idx = BTreeMap::new();
        for &n in &self.model(m).nets {
            net_idx.insert(n, nets.len());
            nets.push(Some(n));
        }
        (nets, net_idx)
    }

    /// Indexes the instances of `m`, 1-based in creation order.
    pub fn index_instances(
        &self,
        m: ModelId,
    ) -> (BasedVec<InstanceId, 1>, BTreeMap<InstanceId, usize>) {
        let mut gates: BasedVec<InstanceId, 1> = BasedVec::new();
        let mut gate_idx = BTreeMap::new();
        for &i in &self.model(m).instances {
            gates.push(i);
            gate_idx.insert(i, gates.len());
        }
        (gates, gate_idx)
    }

    /// Output names for every net of `m`: port-backed nets keep the port
    /// name, others get their own name deduplicated with `$k` suffixes
    /// against the port namespace.
    pub fn shared_names(&self, m: ModelId) -> (BTreeMap<NetId, String>, BTreeSet<NetId>) {
        let model = self.model(m);
        let mut names: BTreeSet<String> = BTreeSet::new();
        let mut net_name: BTreeMap<NetId, String> = BTreeMap::new();
        let mut is_port: BTreeSet<NetId> = BTreeSet::new();
        for &p in &model.ports {
            let port = self.port(p);
            names.insert(port.name.clone());
            if let Some(n) = port.connection {
                if self.net(n).name == port.name {
                    net_name.insert(n, port.name.clone());
                    is_port.insert(n);
                }
            }
        }
        for &n in &model.nets {
            if is_port.contains(&n) {
                continue;
            }
            let base = self.net(n).name.clone();
            let mut name = base.clone();
            let mut k = 2;
            while names.contains(&name) {
                name = format!("{base}${k}");
                k += 1;
            }
            names.insert(name.clone());
            net_name.insert(n, name);
        }
        (net_name, is_port)
    }

    /// Checks the netlist invariants of the top model: bidir ports bound
    /// to pads only, every net named consistently and connected, and every
    /// non-boundary net single-driven with at least one consumer.
    pub fn check(&self, models: &crate::models::Models) -> Result<()> {
        let top = self.top();
        let bnets = self.boundary_nets(models);
        for &n in &self.model(top).nets {
            let net = self.net(n);
            if self.model(top).net_name.get(&net.name) != Some(&n) {
                fatal!("net `{}' not indexed under its name", net.name);
            }
            if net.connections.is_empty() {
                fatal!("net `{}' has no connections", net.name);
            }
            if bnets.contains(&n) {
                continue;
            }
            let mut n_drivers = usize::from(net.is_constant);
            let mut input = false;
            for &p in &net.connections {
                if self.port_is_input(p) {
                    input = true;
                }
                if self.port_is_output(p) {
                    n_drivers += 1;
                }
            }
            if n_drivers != 1 || !input {
                fatal!(
                    "net `{}' has {n_drivers} drivers, {} consumer",
                    net.name,
                    if input { "a" } else { "no" }
                );
            }
        }
        Ok(())
    }

    /// Sets a 1-bit parameter helper used throughout packing.
    pub fn set_param_bit(&mut self, i: InstanceId, name: &str, bit: bool) {
        self.set_param(i, name, Const::bits(BitVec::from_u64(1, u64::from(bit))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_design() -> (Design, ModelId) {
        let mut d = Design::new();
        let top = d.add_model("top").unwrap();
        d.set_top(top);
        (d, top)
    }

    #[test]
    fn duplicate_model_name_rejected() {
        let (mut d, _) = simple_design();
        assert!(d.add_model("top").is_err());
    }

    #[test]
    fn add_net_probes_suffixes() {
        let (mut d, top) = simple_design();
        let a = d.find_or_add_net(top, "x");
        let b = d.add_net(top, "x");
        let c = d.add_net(top, "x");
        assert_eq!(d.net(a).name, "x");
        assert_eq!(d.net(b).name, "x$2");
        assert_eq!(d.net(c).name, "x$3");
    }

    #[test]
    fn temp_nets_are_fresh() {
        let (mut d, top) = simple_design();
        let a = d.add_temp_net(top);
        let b = d.add_temp_net(top);
        assert_ne!(d.net(a).name, d.net(b).name);
        assert!(d.net(a).name.starts_with("$temp$"));
    }

    #[test]
    fn connect_disconnect_tracks_both_sides() {
        let (mut d, top) = simple_design();
        let n = d.find_or_add_net(top, "n");
        let p = d.add_port(NodeRef::Model(top), "a", Direction::In, Value::X);
        d.connect(p, n);
        assert_eq!(d.port(p).connection, Some(n));
        assert!(d.net(n).connections.contains(&p));
        d.disconnect(p);
        assert_eq!(d.port(p).connection, None);
        assert!(d.net(n).connections.is_empty());
    }

    #[test]
    fn connect_moves_between_nets() {
        let (mut d, top) = simple_design();
        let n1 = d.find_or_add_net(top, "n1");
        let n2 = d.find_or_add_net(top, "n2");
        let p = d.add_port(NodeRef::Model(top), "a", Direction::In, Value::X);
        d.connect(p, n1);
        d.connect(p, n2);
        assert!(d.net(n1).connections.is_empty());
        assert!(d.net(n2).connections.contains(&p));
    }

    #[test]
    fn direction_flips_for_model_ports() {
        let (mut d, top) = simple_design();
        let p_in = d.add_port(NodeRef::Model(top), "i", Direction::In, Value::X);
        let p_out = d.add_port(NodeRef::Model(top), "o", Direction::Out, Value::X);
        // A model's input drives the body.
        assert!(d.port_is_output(p_in));
        assert!(d.port_is_input(p_out));
    }

    #[test]
    fn instance_copies_ports_with_natural_direction() {
        let (mut d, top) = simple_design();
        let buf = d.add_model("BUF").unwrap();
        d.add_port(NodeRef::Model(buf), "A", Direction::In, Value::Zero);
        d.add_port(NodeRef::Model(buf), "Y", Direction::Out, Value::X);
        let inst = d.add_instance(top, buf);
        let a = d.find_port(NodeRef::Instance(inst), "A").unwrap();
        let y = d.find_port(NodeRef::Instance(inst), "Y").unwrap();
        assert!(d.port_is_input(a));
        assert!(d.port_is_output(y));
        assert_eq!(d.port(a).undriven, Value::Zero);
    }

    #[test]
    fn remove_instance_disconnects() {
        let (mut d, top) = simple_design();
        let buf = d.add_model("BUF").unwrap();
        d.add_port(NodeRef::Model(buf), "A", Direction::In, Value::X);
        let inst = d.add_instance(top, buf);
        let n = d.find_or_add_net(top, "n");
        let a = d.find_port(NodeRef::Instance(inst), "A").unwrap();
        d.connect(a, n);
        d.remove_instance(inst);
        assert!(d.net(n).connections.is_empty());
        assert!(!d.model(top).instances.contains(&inst));
    }

    #[test]
    fn replace_net_rewires_everything() {
        let (mut d, top) = simple_design();
        let buf = d.add_model("BUF").unwrap();
        d.add_port(NodeRef::Model(buf), "A", Direction::In, Value::X);
        let n1 = d.find_or_add_net(top, "n1");
        let n2 = d.find_or_add_net(top, "n2");
        let mut ports = Vec::new();
        for _ in 0..3 {
            let i = d.add_instance(top, buf);
            let p = d.find_port(NodeRef::Instance(i), "A").unwrap();
            d.connect(p, n1);
            ports.push(p);
        }
        d.replace_net(n1, n2);
        assert_eq!(d.net(n2).connections.len(), 3);
        assert!(d.net(n1).connections.is_empty());
    }

    #[test]
    fn rename_net_always_changes_name() {
        let (mut d, top) = simple_design();
        let n = d.find_or_add_net(top, "sig");
        d.rename_net(top, n, "sig");
        assert_eq!(d.net(n).name, "sig$2");
        assert_eq!(d.find_net(top, "sig"), None);
        assert_eq!(d.find_net(top, "sig$2"), Some(n));
    }

    #[test]
    fn prune_drops_danglers_keeps_constants() {
        let (mut d, top) = simple_design();
        let buf = d.add_model("BUF").unwrap();
        d.add_port(NodeRef::Model(buf), "A", Direction::In, Value::X);
        d.add_port(NodeRef::Model(buf), "Y", Direction::Out, Value::X);

        // Dangling net with no connections at all.
        let dangling = d.find_or_add_net(top, "dangling");

        // Constant net with one consumer survives.
        let konst = d.find_or_add_net(top, "konst");
        d.net_mut(konst).is_constant = true;
        d.net_mut(konst).constant = Value::Zero;
        let i1 = d.add_instance(top, buf);
        let a1 = d.find_port(NodeRef::Instance(i1), "A").unwrap();
        d.connect(a1, konst);

        // Driven net with no consumer goes away.
        let unread = d.find_or_add_net(top, "unread");
        let y1 = d.find_port(NodeRef::Instance(i1), "Y").unwrap();
        d.connect(y1, unread);

        d.prune_model(top);
        assert_eq!(d.find_net(top, "dangling"), None);
        assert_eq!(d.find_net(top, "unread"), None);
        assert_eq!(d.find_net(top, "konst"), Some(konst));
        let _ = dangling;
    }

    #[test]
    fn param_falls_back_to_model_default() {
        let (mut d, top) = simple_design();
        let lut = d.add_model("SB_LUT4").unwrap();
        d.set_model_param(lut, "LUT_INIT", Const::bits_of(1, 0));
        let i = d.add_instance(top, lut);
        assert!(d.has_param(i, "LUT_INIT"));
        assert!(!d.self_has_param(i, "LUT_INIT"));
        assert!(!d.get_param(i, "LUT_INIT").unwrap().get_bit(0).unwrap());
        d.set_param(i, "LUT_INIT", Const::bits_of(1, 1));
        assert!(d.get_param(i, "LUT_INIT").unwrap().get_bit(0).unwrap());
        assert!(d.get_param(i, "NOPE").is_err());
    }

    #[test]
    fn merge_attrs_concatenates_src() {
        let (mut d, top) = simple_design();
        let buf = d.add_model("BUF").unwrap();
        let a = d.add_instance(top, buf);
        let b = d.add_instance(top, buf);
        d.set_attr(a, "src", Const::str("x.v:1"));
        d.set_attr(b, "src", Const::str("y.v:2"));
        d.merge_attrs(a, b);
        assert_eq!(
            d.get_attr(a, "src").unwrap().as_string().unwrap(),
            "x.v:1|y.v:2"
        );
    }

    #[test]
    fn index_nets_reserves_zero() {
        let (mut d, top) = simple_design();
        let a = d.find_or_add_net(top, "a");
        let b = d.find_or_add_net(top, "b");
        let (nets, idx) = d.index_nets(top);
        assert_eq!(nets[0], None);
        assert_eq!(nets[idx[&a]], Some(a));
        assert_eq!(nets[idx[&b]], Some(b));
        assert_eq!(idx[&a], 1);
        assert_eq!(idx[&b], 2);
    }

    #[test]
    fn shared_names_prioritizes_ports() {
        let (mut d, top) = simple_design();
        let p = d.add_port(NodeRef::Model(top), "out", Direction::Out, Value::X);
        let n_out = d.find_or_add_net(top, "out");
        d.connect(p, n_out);
        let n_clash = d.add_net(top, "out"); // becomes out$2 already
        let (names, is_port) = d.shared_names(top);
        assert_eq!(names[&n_out], "out");
        assert!(is_port.contains(&n_out));
        assert_eq!(names[&n_clash], "out$2");
    }

    #[test]
    fn connection_other_port_requires_pairs() {
        let (mut d, top) = simple_design();
        let buf = d.add_model("BUF").unwrap();
        d.add_port(NodeRef::Model(buf), "A", Direction::In, Value::X);
        let n = d.find_or_add_net(top, "n");
        let i1 = d.add_instance(top, buf);
        let i2 = d.add_instance(top, buf);
        let p1 = d.find_port(NodeRef::Instance(i1), "A").unwrap();
        let p2 = d.find_port(NodeRef::Instance(i2), "A").unwrap();
        d.connect(p1, n);
        assert_eq!(d.connection_other_port(p1), None);
        d.connect(p2, n);
        assert_eq!(d.connection_other_port(p1), Some(p2));
    }
}
