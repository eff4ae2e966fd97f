// ── Operation list builders ──
//
// Pure functions from resolved entities to the operation list one command
// submits. Rows created in the same transaction reference each other by
// named uuid.

use serde_json::{Value, json};
use uuid::Uuid;

use ovsync_api::{Condition, Mutation, Operation, Row, value};

use super::requests::{CreatePortRequest, PortKind, VlanTag};
use crate::model::{InterfaceType, TableKind};

const NEW_INTERFACE: &str = "new_interface";
const NEW_PORT: &str = "new_port";
const NEW_BRIDGE: &str = "new_bridge";
const NEW_CONTROLLER: &str = "new_controller";

/// Reply index of the bridge insert in [`create_bridge`].
pub(crate) const CREATE_BRIDGE_RESULT: usize = 2;
/// Reply index of the port insert in [`create_port`].
pub(crate) const CREATE_PORT_RESULT: usize = 1;
/// Reply index of the controller insert in [`update_bridge_controller`].
pub(crate) const UPDATE_CONTROLLER_RESULT: usize = 0;

fn named_ref(name: &str) -> Value {
    value::set([value::named_uuid(name)])
}

fn uuid_ref(id: Uuid) -> Value {
    value::set([value::uuid(id)])
}

fn tag_value(tag: Option<VlanTag>) -> Value {
    tag.map_or_else(value::empty_set, |t| json!(t.get()))
}

/// A bridge with a same-named internal port and interface, linked under
/// the root row.
pub(crate) fn create_bridge(root: Uuid, name: &str) -> Vec<Operation> {
    vec![
        Operation::insert_named(
            TableKind::Interface.name(),
            Row::new()
                .with("name", json!(name))
                .with("type", json!(InterfaceType::Internal.as_wire())),
            NEW_INTERFACE,
        ),
        Operation::insert_named(
            TableKind::Port.name(),
            Row::new()
                .with("name", json!(name))
                .with("interfaces", named_ref(NEW_INTERFACE)),
            NEW_PORT,
        ),
        Operation::insert_named(
            TableKind::Bridge.name(),
            Row::new()
                .with("name", json!(name))
                .with("ports", named_ref(NEW_PORT))
                .with("stp_enable", json!(false)),
            NEW_BRIDGE,
        ),
        Operation::mutate(
            TableKind::OpenVSwitch.name(),
            vec![Condition::uuid_is(root)],
            vec![Mutation::insert("bridges", named_ref(NEW_BRIDGE))],
        ),
    ]
}

/// Unlink a bridge from the root row and delete it. Its ports and
/// interfaces become unreferenced and are collected by the server.
pub(crate) fn delete_bridge(root: Uuid, bridge: Uuid) -> Vec<Operation> {
    vec![
        Operation::mutate(
            TableKind::OpenVSwitch.name(),
            vec![Condition::uuid_is(root)],
            vec![Mutation::delete("bridges", uuid_ref(bridge))],
        ),
        Operation::delete(TableKind::Bridge.name(), vec![Condition::uuid_is(bridge)]),
    ]
}

/// Create a controller row for `target` and point the bridge at it.
pub(crate) fn update_bridge_controller(bridge: Uuid, target: &str) -> Vec<Operation> {
    vec![
        Operation::insert_named(
            TableKind::Controller.name(),
            Row::new().with("target", json!(target)),
            NEW_CONTROLLER,
        ),
        Operation::update(
            TableKind::Bridge.name(),
            vec![Condition::uuid_is(bridge)],
            Row::new().with("controller", named_ref(NEW_CONTROLLER)),
        ),
    ]
}

/// An interface and port for `request`, attached to `bridge`.
pub(crate) fn create_port(bridge: Uuid, request: &CreatePortRequest) -> Vec<Operation> {
    let mut interface = Row::new().with("name", json!(request.name));
    match &request.kind {
        PortKind::Internal => {
            interface.insert("type", json!(InterfaceType::Internal.as_wire()));
        }
        PortKind::Veth => {
            interface.insert("type", json!(InterfaceType::System.as_wire()));
        }
        PortKind::Patch { peer } => {
            interface.insert("type", json!(InterfaceType::Patch.as_wire()));
            interface.insert("options", value::string_map([("peer", peer.as_str())]));
        }
    }

    let mut port = Row::new()
        .with("name", json!(request.name))
        .with("interfaces", named_ref(NEW_INTERFACE));
    if let Some(tag) = request.tag {
        port.insert("tag", json!(tag.get()));
    }

    vec![
        Operation::insert_named(TableKind::Interface.name(), interface, NEW_INTERFACE),
        Operation::insert_named(TableKind::Port.name(), port, NEW_PORT),
        Operation::mutate(
            TableKind::Bridge.name(),
            vec![Condition::uuid_is(bridge)],
            vec![Mutation::insert("ports", named_ref(NEW_PORT))],
        ),
    ]
}

/// Detach a port from its bridge and delete it.
pub(crate) fn delete_port(bridge: Uuid, port: Uuid) -> Vec<Operation> {
    vec![
        Operation::mutate(
            TableKind::Bridge.name(),
            vec![Condition::uuid_is(bridge)],
            vec![Mutation::delete("ports", uuid_ref(port))],
        ),
        Operation::delete(TableKind::Port.name(), vec![Condition::uuid_is(port)]),
    ]
}

/// Set the access VLAN of a port; `None` clears it.
pub(crate) fn update_port_tag(port: Uuid, tag: Option<VlanTag>) -> Vec<Operation> {
    vec![Operation::update(
        TableKind::Port.name(),
        vec![Condition::uuid_is(port)],
        Row::new().with("tag", tag_value(tag)),
    )]
}

pub(crate) fn remove_interface_from_port(port: Uuid, interface: Uuid) -> Vec<Operation> {
    vec![Operation::mutate(
        TableKind::Port.name(),
        vec![Condition::uuid_is(port)],
        vec![Mutation::delete("interfaces", uuid_ref(interface))],
    )]
}
