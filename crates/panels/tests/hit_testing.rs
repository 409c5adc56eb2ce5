use panels::{
    MemoryDevice, MouseAction, Panel, PanelHandle, PanelManager, RouteOutcome, SharedDevice,
};

type Handle = PanelHandle<MemoryDevice>;

fn panel_at(
    device: &SharedDevice<MemoryDevice>,
    manager: &PanelManager<MemoryDevice>,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
) -> Handle {
    let panel = Panel::new(device, manager, width, height, None).unwrap();
    panel.borrow_mut().set_position(x, y).unwrap();
    panel
}

fn is(found: Option<Handle>, expected: &Handle) -> bool {
    found.is_some_and(|found| found.ptr_eq(expected))
}

#[test]
fn rectangle_is_half_open() {
    let device = SharedDevice::new(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = panel_at(&device, &manager, 10, 10, 20, 20);

    assert!(is(manager.find_at(10, 10), &panel));
    assert!(is(manager.find_at(29, 29), &panel));
    assert!(manager.find_at(30, 10).is_none());
    assert!(manager.find_at(10, 30).is_none());
    assert!(manager.find_at(9, 10).is_none());
}

#[test]
fn overlapping_panels_resolve_to_first_registered() {
    let device = SharedDevice::new(MemoryDevice::new());
    let manager = PanelManager::new();
    let first = panel_at(&device, &manager, 0, 0, 50, 50);
    let second = panel_at(&device, &manager, 25, 25, 50, 50);

    assert!(is(manager.find_at(30, 30), &first));
    assert!(is(manager.find_at(60, 60), &second));
    assert!(manager.find_at(80, 80).is_none());
}

#[test]
fn lookup_does_not_change_state() {
    let device = SharedDevice::new(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = panel_at(&device, &manager, 0, 0, 10, 10);
    device.borrow_mut().clear_calls();

    let first = manager.find_at(5, 5);
    let second = manager.find_at(5, 5);

    assert!(is(first, &panel));
    assert!(is(second, &panel));
    assert!(manager.active_panel().is_none());
    assert!(device.borrow().calls().is_empty());
}

#[test]
fn negative_positions_are_hit_tested() {
    let device = SharedDevice::new(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = panel_at(&device, &manager, -20, -20, 30, 30);

    assert!(is(manager.find_at(-20, -20), &panel));
    assert!(is(manager.find_at(9, 9), &panel));
    assert!(manager.find_at(10, 9).is_none());

    let outcome = manager.route(MouseAction::Press, 0, 0);
    assert!(matches!(outcome, RouteOutcome::Panel(_)));
}

#[test]
fn destroyed_panels_are_not_found() {
    let device = SharedDevice::new(MemoryDevice::new());
    let manager = PanelManager::new();
    let below = panel_at(&device, &manager, 0, 0, 40, 40);
    let above = panel_at(&device, &manager, 0, 0, 40, 40);

    below.destroy();

    assert!(is(manager.find_at(1, 1), &above));
    assert_eq!(manager.len(), 1);
}

#[test]
fn missed_route_leaves_active_panel_alone() {
    let device = SharedDevice::new(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = panel_at(&device, &manager, 0, 0, 10, 10);

    manager.route(MouseAction::Press, 1, 1);
    assert!(manager.route(MouseAction::Press, 500, 500).is_missed());

    assert!(is(manager.active_panel(), &panel));
}

#[test]
fn drag_follows_pointer_deltas() {
    let device = SharedDevice::new(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = panel_at(&device, &manager, 0, 0, 10, 10);

    manager.route(MouseAction::Press, 5, 5);
    manager.set_dragging(true);
    manager.drag_active(7, -3).unwrap();
    manager.drag_active(1, 1).unwrap();
    manager.set_dragging(false);

    assert_eq!(panel.borrow().position(), panels::Position::new(8, -2));
    assert!(is(manager.find_at(8, -2), &panel));
}
