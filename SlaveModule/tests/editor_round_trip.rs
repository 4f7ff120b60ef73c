use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;

use rigsync_frontend::Frontend;
use rigsync_shared::object::{ComponentDesc, EntityDesc};
use rigsync_shared::stream::{direct_pair, DirectStream};
use rigsync_shared::*;
use rigsync_simulator::Simulator;
use rigsync_slave::{Slave, SlaveMaster};

static SET_LOGGER_ONCE: Once = Once::new();

fn init_logger() {
    SET_LOGGER_ONCE.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Editor, slave and simulator wired through in-process streams
struct Rig {
    master: SlaveMaster<DirectStream<EditorRequest, EditorReply>>,
    editor_end: DirectStream<EditorReply, EditorRequest>,
    slave: Slave,
    simulator: Simulator,
    simulator_end: DirectStream<SimulatorReply, SimulatorRequest>,
}

impl Rig {
    fn new() -> Self {
        let (editor, editor_end) = direct_pair::<EditorRequest, EditorReply>();
        let (front, simulator_end) = direct_pair::<SimulatorRequest, SimulatorReply>();
        let frontend = Frontend::with_stream(SyncConfig::default(), Box::new(front));

        Self {
            master: SlaveMaster::new(editor),
            editor_end,
            slave: Slave::new(frontend),
            simulator: Simulator::new(SyncConfig::default()),
            simulator_end,
        }
    }

    /// Run every party a few times and return what the editor received
    fn pump(&mut self, rounds: usize) -> Vec<EditorReply> {
        let mut replies = Vec::new();
        for _ in 0..rounds {
            replies.extend(self.master.poll().unwrap());
            self.slave.serve(&mut self.editor_end).unwrap();
            self.simulator.poll(&mut self.simulator_end).unwrap();
        }
        replies.extend(self.master.poll().unwrap());
        replies
    }
}

fn scene_with_entity() -> UiDescription {
    UiDescription {
        ops: vec![Operation::AddEntity {
            parent_id: 0,
            entity: EntityDesc { id: 100, label: "E".to_string(), properties: Vec::new() },
        }],
    }
}

#[test]
fn editor_component_gets_a_canonical_id() {
    init_logger();
    let mut rig = Rig::new();

    let registered = Rc::new(RefCell::new(Vec::new()));
    let observed = registered.clone();
    rig.slave.frontend_mut().observe_diffs(Box::new(move |diff, _scene, _registry| {
        for record in &diff.operations {
            if let Operation::RegisterObject { temporary_id, canonical_id } = record.op {
                observed.borrow_mut().push((record.sequence, temporary_id, canonical_id));
            }
        }
    }));

    let load = rig.master.load(scene_with_entity());
    let replies = rig.pump(4);
    assert_eq!(replies, vec![EditorReply::LoadResult { id: load, status: RequestStatus::Ok }]);

    let entity = rig.slave.edit_registry().lookup(100).unwrap();
    let entity_id = rig.slave.frontend().id_of(entity).unwrap();
    assert!(is_canonical_id(entity_id));

    // The editor names the new component with its own temporary id
    let edit = rig.master.edit(vec![Operation::AddComponent {
        entity_id: 100,
        component: ComponentDesc { id: 1, type_name: "light".to_string(), properties: Vec::new() },
    }]);
    let replies = rig.pump(4);
    assert_eq!(replies, vec![EditorReply::EditResult { id: edit, status: RequestStatus::Ok }]);

    let registered = registered.borrow();
    assert_eq!(registered.len(), 1);
    let (sequence, temporary_id, canonical_id) = registered[0];
    assert_eq!(sequence, 0);
    assert!(is_temporary_id(temporary_id));
    assert!(is_canonical_id(canonical_id));

    // Frontend side
    let frontend = rig.slave.frontend();
    let component = rig.slave.edit_registry().lookup(1).unwrap();
    assert_eq!(frontend.id_of(component), Some(canonical_id));
    assert!(frontend.lookup(temporary_id).is_none());
    assert_eq!(frontend.scene().component_owner(component), Some(entity));

    // Simulator side
    let simulated_component = rig.simulator.lookup(canonical_id).unwrap();
    let simulated_entity = rig.simulator.lookup(entity_id).unwrap();
    assert_eq!(rig.simulator.scene().component_owner(simulated_component), Some(simulated_entity));
    assert!(rig.simulator.lookup(temporary_id).is_none());
}

#[test]
fn stale_edits_are_reported_to_the_editor() {
    init_logger();
    let mut rig = Rig::new();

    rig.master.load(scene_with_entity());
    rig.pump(4);

    let edit = rig.master.edit(vec![
        Operation::SetProperty { object_id: 100, property_id: 2, value: PropertyValue::Float(1.5) },
        Operation::SetProperty { object_id: 999, property_id: 2, value: PropertyValue::Float(1.5) },
    ]);
    let replies = rig.pump(4);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].id(), edit);
    assert!(!replies[0].status().is_ok());

    // The edit that applied still reached the simulator
    let entity = rig.slave.edit_registry().lookup(100).unwrap();
    let entity_id = rig.slave.frontend().id_of(entity).unwrap();
    let simulated = rig.simulator.lookup(entity_id).unwrap();
    assert_eq!(rig.simulator.scene().get_property(simulated, 2), Some(&PropertyValue::Float(1.5)));
}

#[test]
fn editor_deletes_are_collected_everywhere() {
    init_logger();
    let mut rig = Rig::new();

    rig.master.load(scene_with_entity());
    rig.pump(4);
    let entity = rig.slave.edit_registry().lookup(100).unwrap();
    let entity_id = rig.slave.frontend().id_of(entity).unwrap();

    let edit = rig.master.edit(vec![Operation::DeleteEntity { entity_id: 100 }]);
    let replies = rig.pump(4);
    assert_eq!(replies, vec![EditorReply::EditResult { id: edit, status: RequestStatus::Ok }]);

    assert!(rig.simulator.lookup(entity_id).is_none());
    assert!(rig.slave.edit_registry().lookup(100).is_none());
    assert!(rig.slave.frontend().lookup(entity_id).is_none());
}
