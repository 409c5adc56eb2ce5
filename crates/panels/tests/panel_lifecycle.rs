use std::cell::RefCell;
use std::rc::Rc;

use panels::gpu::memory::{DeviceCall, FailPoint};
use panels::{
    ActionRegion, ImageLayout, MemoryDevice, MouseAction, Panel, PanelManager, Rect,
    ResourceError, SharedDevice,
};

fn shared(device: MemoryDevice) -> SharedDevice<MemoryDevice> {
    SharedDevice::new(device)
}

#[test]
fn press_inside_region_reports_region_local_coordinates() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 100, 50, None).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    panel.borrow_mut().add_action_region(
        ActionRegion::new(Rect::new(0, 0, 100, 50)).on_press(move |args| {
            sink.borrow_mut().push((args.index, args.x, args.y));
        }),
    );

    let outcome = manager.route(MouseAction::Press, 50, 30);

    assert!(matches!(outcome, panels::RouteOutcome::Region { index: 0, .. }));
    assert_eq!(*seen.borrow(), vec![(0, 40, 20)]);
    assert!(manager
        .active_panel()
        .is_some_and(|active| active.ptr_eq(&panel)));
}

#[test]
fn region_offsets_are_subtracted_and_first_overlap_wins() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 60, 60, None).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    for rect in [Rect::new(20, 20, 30, 30), Rect::new(0, 0, 60, 60)] {
        let sink = seen.clone();
        panel.borrow_mut().add_action_region(ActionRegion::new(rect).on_release(
            move |args| sink.borrow_mut().push((args.index, args.x, args.y)),
        ));
    }

    let mut guard = panel.borrow_mut();
    assert_eq!(guard.dispatch(MouseAction::Release, 25, 27), Some(0));
    assert_eq!(guard.dispatch(MouseAction::Release, 5, 5), Some(1));
    assert_eq!(*seen.borrow(), vec![(0, 5, 7), (1, 5, 5)]);
}

#[test]
fn overlapping_press_invokes_only_first_registered_region() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 20, 20, None).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    for name in ["a", "b"] {
        let sink = seen.clone();
        panel.borrow_mut().add_action_region(
            ActionRegion::new(Rect::new(0, 0, 10, 10))
                .on_press(move |_| sink.borrow_mut().push(name)),
        );
    }

    let hit = panel.borrow_mut().dispatch(MouseAction::Press, 5, 5);

    assert_eq!(hit, Some(0));
    assert_eq!(*seen.borrow(), vec!["a"]);
}

#[test]
fn press_miss_still_activates_panel() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 40, 40, None).unwrap();
    panel
        .borrow_mut()
        .add_action_region(ActionRegion::new(Rect::new(0, 0, 10, 10)));

    let outcome = manager.route(MouseAction::Press, 45, 45);
    assert!(matches!(outcome, panels::RouteOutcome::Panel(_)));
    assert!(manager.active_panel().is_some());

    manager.clear_active();
    assert!(panel
        .borrow_mut()
        .dispatch(MouseAction::Release, 30, 30)
        .is_none());
    assert!(manager.active_panel().is_none());
}

#[test]
fn region_without_matching_callback_still_counts_as_hit() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 10, 10, None).unwrap();
    panel.borrow_mut().add_action_region(
        ActionRegion::new(Rect::new(0, 0, 10, 10)).on_press(|_| panic!("press only")),
    );

    assert_eq!(
        panel.borrow_mut().dispatch(MouseAction::Release, 1, 1),
        Some(0)
    );
}

#[test]
fn callback_may_move_its_own_panel() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 20, 20, None).unwrap();
    panel.borrow_mut().add_action_region(
        ActionRegion::new(Rect::new(0, 0, 20, 20)).on_press(|args| {
            args.panel.set_position(200, 100).unwrap();
        }),
    );

    manager.route(MouseAction::Press, 15, 15);

    assert_eq!(panel.borrow().position(), panels::Position::new(200, 100));
    assert!(manager.find_at(15, 15).is_none());
    assert!(manager.find_at(205, 105).is_some());
}

#[test]
fn callback_may_destroy_its_own_panel() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 20, 20, None).unwrap();
    panel.borrow_mut().add_action_region(
        ActionRegion::new(Rect::new(0, 0, 20, 20)).on_press(|args| args.panel.destroy()),
    );

    manager.route(MouseAction::Press, 12, 12);

    assert!(panel.borrow().is_destroyed());
    assert!(manager.is_empty());
    assert!(manager.active_panel().is_none());
    assert!(device.borrow().is_idle());
    assert!(device.borrow().violations().is_empty());
}

#[test]
fn sync_with_padded_rows_round_trips_and_becomes_sampleable() {
    let device = shared(MemoryDevice::new().with_row_alignment(256));
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 3, 2, None).unwrap();

    let mut guard = panel.borrow_mut();
    let surface = guard.surface_mut().unwrap();
    surface.fill_rect(0, 0, 3, 1, image::Rgba([200, 10, 20, 255]));
    surface.fill_rect(0, 1, 3, 1, image::Rgba([5, 6, 7, 8]));
    let expected = surface.as_bytes().to_vec();

    guard.sync_texture().unwrap();

    let image = guard.texture_image().unwrap();
    assert_eq!(device.borrow().image_contents(image).unwrap(), &expected[..]);
    assert_eq!(guard.texture_layout(), Some(ImageLayout::ShaderReadOnly));
    assert!(guard.is_drawable());
    assert_eq!(device.borrow().live_buffers(), 1);
}

#[test]
fn destroy_releases_in_reverse_order() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 8, 8, None).unwrap();
    panel.borrow_mut().sync_texture().unwrap();

    let (vertex, image, set) = {
        let guard = panel.borrow();
        (
            guard.vertex_buffer().unwrap(),
            guard.texture_image().unwrap(),
            guard.descriptor_set().unwrap(),
        )
    };
    device.borrow_mut().clear_calls();

    panel.destroy();

    let device = device.borrow();
    let calls = device.calls();
    assert_eq!(calls.len(), 6);
    assert_eq!(calls[0], DeviceCall::DestroyDescriptorSet(set));
    assert!(matches!(calls[1], DeviceCall::DestroyImageView(_)));
    assert_eq!(calls[2], DeviceCall::DestroyImage(image));
    assert!(matches!(calls[3], DeviceCall::FreeMemory(_)));
    assert_eq!(calls[4], DeviceCall::DestroyBuffer(vertex));
    assert!(matches!(calls[5], DeviceCall::FreeMemory(_)));
    assert!(device.violations().is_empty());
    assert!(device.is_idle());
}

#[test]
fn destroy_twice_is_harmless() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 8, 8, None).unwrap();

    panel.destroy();
    let calls = device.borrow().calls().len();
    panel.destroy();

    assert_eq!(device.borrow().calls().len(), calls);
    assert!(device.borrow().violations().is_empty());
}

#[test]
fn destroy_drops_region_callbacks_without_running_them() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 8, 8, None).unwrap();
    let token = Rc::new(());
    let held = token.clone();
    panel.borrow_mut().add_action_region(
        ActionRegion::new(Rect::new(0, 0, 8, 8)).on_press(move |_| {
            assert!(Rc::strong_count(&held) > 0);
            panic!("must not run");
        }),
    );
    assert_eq!(Rc::strong_count(&token), 2);

    panel.destroy();

    assert_eq!(Rc::strong_count(&token), 1);
    assert!(panel.borrow().regions().is_empty());
    assert!(panel.borrow().surface().is_none());
}

#[test]
fn every_partial_construction_failure_leaves_device_idle() {
    let points = [
        (FailPoint::CreateBuffer, 1),
        (FailPoint::CreateBuffer, 2),
        (FailPoint::WriteMemory, 1),
        (FailPoint::CopyBuffer, 1),
        (FailPoint::CreateImage, 1),
        (FailPoint::CreateImageView, 1),
        (FailPoint::CreateDescriptorSet, 1),
    ];
    for (point, nth) in points {
        let device = shared(MemoryDevice::new());
        device.borrow_mut().fail_on(point, nth);
        let manager = PanelManager::new();

        let result = Panel::new(&device, &manager, 16, 16, None);

        assert!(result.is_err(), "{point:?}#{nth} should fail construction");
        let device = device.borrow();
        assert!(device.is_idle(), "{point:?}#{nth} leaked resources");
        assert!(
            device.violations().is_empty(),
            "{point:?}#{nth}: {:?}",
            device.violations()
        );
        assert!(manager.is_empty());
    }
}

#[test]
fn failed_sync_is_reported_and_retry_recovers() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 4, 4, None).unwrap();
    device
        .borrow_mut()
        .fail_on(FailPoint::CopyBufferToImage, 1);

    let mut guard = panel.borrow_mut();
    assert!(matches!(guard.sync_texture(), Err(ResourceError::Copy(_))));
    assert!(!guard.is_drawable());
    assert_eq!(device.borrow().live_buffers(), 1);

    guard.sync_texture().unwrap();
    assert!(guard.is_drawable());
}

#[test]
fn dropping_last_handle_releases_resources() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let panel = Panel::new(&device, &manager, 8, 8, None).unwrap();
    panel.borrow_mut().sync_texture().unwrap();

    drop(panel);

    assert!(device.borrow().is_idle());
    assert!(device.borrow().violations().is_empty());
}

#[test]
fn release_while_device_is_borrowed_is_deferred_not_leaked() {
    let device = shared(MemoryDevice::new());
    let manager = PanelManager::new();
    let dropped = Panel::new(&device, &manager, 8, 8, None).unwrap();
    let destroyed = Panel::new(&device, &manager, 8, 8, None).unwrap();
    dropped.borrow_mut().sync_texture().unwrap();

    {
        let _inspect = device.borrow();
        drop(dropped);
        destroyed.destroy();
        assert_eq!(device.pending_releases(), 2);
    }

    let gpu = device.borrow();
    assert!(gpu.is_idle());
    assert!(gpu.violations().is_empty());
    drop(gpu);
    assert_eq!(device.pending_releases(), 0);
    assert!(destroyed.borrow().is_destroyed());
}
