//! Failures degrade one controller and never abort bring-up.

mod common;

use common::{FILTER, FakeDevice, GET_STATUS, driver_image, full_driver, identify};
use nvpm::{Config, ControllerEntry, Error, FunctionId, PowerManager, Quirks};
use nvpm_power::PowerStateDescriptor as Psd;

#[test]
fn test_apst_failure_falls_back_to_host_levels() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());
    let device = FakeDevice::new(1, &identify()).failing_set_features().shared();
    let token = manager.on_controller_published(device.clone());

    let entry = manager.registry().get(token).unwrap();
    let entry = entry.lock();
    assert!(!entry.apst_active());
    assert!(entry.apst().is_none());

    // The low power level is now host-managed and targets the deepest state.
    let table = entry.power_table().unwrap();
    assert_eq!(table.len(), 5);
    let low = table.level(1).unwrap();
    assert!(!low.autonomous);
    assert_eq!(low.host_target(), Some(4));
    assert_eq!(device.state.lock().registered.len(), 1);
}

#[test]
fn test_incomplete_layout_skips_feature_commands() {
    let manager = PowerManager::new(Config::default());
    let image = driver_image(&[
        (FunctionId::RequestGetStatus, GET_STATUS),
        (FunctionId::FilterInterruptRequest, FILTER),
    ]);
    assert!(!manager.on_driver_loaded(&image));

    let device = FakeDevice::new(2, &identify()).shared();
    let token = manager.on_controller_published(device.clone());

    assert!(device.state.lock().commands.is_empty());
    assert_eq!(device.state.lock().registered.len(), 1);

    let entry = manager.registry().get(token).unwrap();
    assert!(!entry.lock().apst_active());
    assert!(matches!(
        manager.apst_enabled(2),
        Err(Error::CapabilityUnavailable(_))
    ));
}

#[test]
fn test_missing_msi_offset_skips_write() {
    let manager = PowerManager::new(Config::default());
    let image = driver_image(&[(FunctionId::RequestGetStatus, GET_STATUS)]);
    manager.on_driver_loaded(&image);

    let device = FakeDevice::new(3, &identify()).shared();
    manager.on_controller_published(device.clone());
    assert!(device.state.lock().writes.is_empty());
}

#[test]
fn test_apple_controller_skipped() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());
    let device = FakeDevice::new(4, &identify()).with_pci(0x106b, 0x2005).shared();
    let token = manager.on_controller_published(device.clone());

    let state = device.state.lock();
    assert_eq!(state.identify_reads, 0);
    assert!(state.writes.is_empty());
    assert!(state.commands.is_empty());
    assert!(state.registered.is_empty());
    drop(state);

    let entry = manager.registry().get(token).unwrap();
    assert!(entry.lock().skipped());
    assert_eq!(manager.active_power_state(4, 1), None);
}

#[test]
fn test_invalid_identify_leaves_controller_alone() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());

    let mut data = identify().encode();
    data[263] = 32;
    let device = FakeDevice::new(5, &identify()).with_raw_identify(data).shared();
    let token = manager.on_controller_published(device.clone());

    let entry = manager.registry().get(token).unwrap();
    let entry = entry.lock();
    assert!(entry.processed());
    assert!(entry.plan().is_none());
    assert!(device.set_commands().is_empty());
    assert!(device.state.lock().registered.is_empty());
}

#[test]
fn test_short_identify_is_invalid_capability() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());
    let device = FakeDevice::new(6, &identify())
        .with_raw_identify(vec![0; 512])
        .shared();
    let token = manager.on_controller_published(device);

    let entry = manager.registry().get(token).unwrap();
    let result = entry.lock().reidentify(manager.layout(), manager.config());
    assert!(matches!(result, Err(Error::InvalidCapability(_))));
}

#[test]
fn test_zero_latency_ceiling_disables_apst() {
    let manager = PowerManager::new(Config::default().with_max_latency(0));
    manager.on_driver_loaded(&full_driver());
    let device = FakeDevice::new(7, &identify()).shared();
    manager.on_controller_published(device.clone());

    assert!(device.set_commands().is_empty());
    let state = device.state.lock();
    assert_eq!(state.registered[0].level(1).and_then(|l| l.host_target()), Some(4));
}

#[test]
fn test_device_latency_override() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());

    // Ceiling below ps4's exit latency leaves ps3 as the only target.
    let device = FakeDevice::new(8, &identify())
        .with_latency_override(5000)
        .shared();
    let token = manager.on_controller_published(device);

    let entry = manager.registry().get(token).unwrap();
    let entry = entry.lock();
    assert_eq!(entry.ps_max_latency_us(), 5000);
    let apst = entry.apst().unwrap();
    assert_eq!(apst.deepest_target, 3);
    assert_eq!(apst.max_latency_us, 2000);
    assert!(!apst.table.entry(3).is_enabled());
}

#[test]
fn test_simple_suspend_keeps_host_levels() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());

    // LiteON firmware with the suspend-to-idle race.
    let id = identify().with_vendor(0x14a4).with_firmware("22301111");
    let device = FakeDevice::new(9, &id).shared();
    let token = manager.on_controller_published(device.clone());

    let entry = manager.registry().get(token).unwrap();
    let entry = entry.lock();
    assert!(entry.quirks().contains(Quirks::SIMPLE_SUSPEND));
    assert!(entry.power_table().is_none());
    assert!(device.state.lock().registered.is_empty());
    assert_eq!(entry.tickle_level(2), 2);
}

#[test]
fn test_no_operational_state_registers_nothing() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());
    let id = identify().with_power_states(&[Psd::non_operational(5, 10, 10)]);
    let device = FakeDevice::new(10, &id).shared();
    manager.on_controller_published(device.clone());

    assert!(device.state.lock().registered.is_empty());
}

#[test]
fn test_platform_quirk_disables_apst() {
    let config = Config::default().with_platform(
        nvpm::PlatformInfo::default()
            .with_vendor("ASUSTeK COMPUTER INC.")
            .with_board("PRIME B350M-A"),
    );
    let manager = PowerManager::new(config);
    manager.on_driver_loaded(&full_driver());
    let device = FakeDevice::new(11, &identify()).with_pci(0x144d, 0xa804).shared();
    let token = manager.on_controller_published(device.clone());

    let entry = manager.registry().get(token).unwrap();
    assert!(entry.lock().quirks().contains(Quirks::NO_APST));
    assert!(device.set_commands().is_empty());
}

#[test]
fn test_rejected_power_levels_not_kept() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());
    let device = FakeDevice::new(12, &identify()).failing_registration().shared();
    let token = manager.on_controller_published(device.clone());

    let entry = manager.registry().get(token).unwrap();
    {
        let entry = entry.lock();
        assert!(entry.processed());
        assert!(entry.power_table().is_none());
        // APST itself was accepted by the controller.
        assert!(entry.apst_active());
    }
    assert!(device.state.lock().registered.is_empty());
    assert_eq!(manager.active_power_state(12, 0), None);
    assert_eq!(manager.activity_tickle(12, 2), 2);

    let result = entry.lock().reidentify(manager.layout(), manager.config());
    assert!(matches!(result, Err(Error::DeviceCommandFailure(_))));
    assert!(entry.lock().power_table().is_none());
}

#[test]
fn test_reidentify_before_bring_up_is_deferred() {
    let manager = PowerManager::new(Config::default());
    manager.on_driver_loaded(&full_driver());
    let device = FakeDevice::new(13, &identify()).shared();
    let mut entry = ControllerEntry::new(device.clone());

    entry.reidentify(manager.layout(), manager.config()).unwrap();
    assert!(!entry.processed());
    assert!(entry.plan().is_none());
    assert!(entry.power_table().is_none());

    let state = device.state.lock();
    assert_eq!(state.identify_reads, 0);
    assert!(state.commands.is_empty());
    assert!(state.registered.is_empty());
}
