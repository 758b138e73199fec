//! VM session tests against a recording fake runtime.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{with_runtime, FakeLoader};
use monohost::{Coordinator, DomainHandle, HostError, NORMAL_VERSION};

fn setup() -> (Arc<FakeLoader>, Arc<Coordinator>) {
    with_runtime(|rt| *rt = Default::default());
    let loader = Arc::new(FakeLoader::default());
    let coordinator = Arc::new(Coordinator::new(loader.clone()));
    (loader, coordinator)
}

#[test]
fn test_end_to_end_scenario() {
    let (loader, coordinator) = setup();
    with_runtime(|rt| {
        rt.domain = 0xd0;
        rt.assembly = 0xa0;
        rt.open_status = 0;
        rt.exit_code = 42;
    });

    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();

    vm.initialize(&[("TRUSTED_PLATFORM_ASSEMBLIES", "/app/a.dll:/app/b.dll")])
        .unwrap();
    let domain = vm.start("host", "v4.0.30319").unwrap();
    assert!(!domain.is_null());
    let assembly = vm.open_assembly(domain, "/app/Main.dll").unwrap();
    let exit_code = vm.execute(domain, assembly, &["run"]).unwrap();
    assert_eq!(exit_code, 42);

    with_runtime(|rt| {
        assert_eq!(
            rt.properties,
            vec![("TRUSTED_PLATFORM_ASSEMBLIES".to_string(), "/app/a.dll:/app/b.dll".to_string())]
        );
        assert_eq!(rt.started, Some(("host".to_string(), "v4.0.30319".to_string())));
        assert_eq!(rt.opened, vec!["/app/Main.dll".to_string()]);
        assert_eq!(rt.executed, Some((0xd0, 0xa0, vec!["run".to_string()])));
    });

    drop(vm);
    host.release();
    let status = coordinator.status();
    assert_eq!(status.reference_count, 0);
    assert_eq!(status.loaded_path, None);
    assert_eq!(loader.unloads(), 1);
}

#[test]
fn test_initialize_preserves_property_order() {
    let (_, coordinator) = setup();
    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();

    let props = vec![
        ("TRUSTED_PLATFORM_ASSEMBLIES".to_string(), "/app/a.dll".to_string()),
        ("APP_PATHS".to_string(), "/app".to_string()),
        ("PLATFORM_RESOURCE_ROOTS".to_string(), String::new()),
    ];
    vm.initialize(&props).unwrap();

    with_runtime(|rt| assert_eq!(rt.properties, props));
}

#[test]
fn test_initialize_with_no_properties() {
    let (_, coordinator) = setup();
    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();

    vm.initialize::<&str, &str>(&[]).unwrap();
    with_runtime(|rt| assert!(rt.properties.is_empty()));
}

#[test]
fn test_start_passes_null_domain_through() {
    let (_, coordinator) = setup();
    with_runtime(|rt| rt.domain = 0);
    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();

    let domain = vm.start("mono_in_core", NORMAL_VERSION).unwrap();
    assert!(domain.is_null());
    assert_eq!(domain, DomainHandle::from_raw(std::ptr::null_mut()));
}

#[test]
fn test_open_assembly_success_returns_pointer() {
    let (_, coordinator) = setup();
    with_runtime(|rt| {
        rt.assembly = 0xbeef0;
        rt.open_status = 0;
    });
    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();

    let domain = DomainHandle::from_raw(0x10 as *mut _);
    let assembly = vm.open_assembly(domain, "/app/InnerApp.dll").unwrap();
    assert_eq!(assembly.as_ptr() as usize, 0xbeef0);
}

#[test]
fn test_open_assembly_failures() {
    let (_, coordinator) = setup();
    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();
    let domain = DomainHandle::from_raw(0x10 as *mut _);

    // (pointer, status)
    let cases = [(0xa0, 1), (0, 0), (0, 3), (0xa0, -1)];
    for (assembly, status) in cases {
        with_runtime(|rt| {
            rt.assembly = assembly;
            rt.open_status = status;
        });
        match vm.open_assembly(domain, "/app/Broken.dll") {
            Err(HostError::AssemblyOpenFailed { path, status: got }) => {
                assert_eq!(path, "/app/Broken.dll");
                assert_eq!(got, status);
            }
            other => panic!("expected AssemblyOpenFailed for {:?}, got {:?}", (assembly, status), other),
        }
    }
}

#[test]
fn test_execute_returns_raw_exit_code() {
    let (_, coordinator) = setup();
    with_runtime(|rt| {
        rt.assembly = 0xa0;
        rt.domain = 0xd0;
    });
    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();
    let domain = vm.start("host", NORMAL_VERSION).unwrap();
    let assembly = vm.open_assembly(domain, "/app/Main.dll").unwrap();

    for code in [0, 1, -1, 255, i32::MIN] {
        with_runtime(|rt| rt.exit_code = code);
        assert_eq!(vm.execute(domain, assembly, &["a", "b c", ""]).unwrap(), code);
    }
    with_runtime(|rt| {
        let (_, _, args) = rt.executed.clone().unwrap();
        assert_eq!(args, vec!["a".to_string(), "b c".to_string(), String::new()]);
    });

    let no_args: [&str; 0] = [];
    assert_eq!(vm.execute(domain, assembly, &no_args).unwrap(), i32::MIN);
}

#[test]
fn test_interior_nul_is_rejected_before_call() {
    let (_, coordinator) = setup();
    with_runtime(|rt| rt.assembly = 0xa0);
    let host = coordinator.acquire("/lib/libruntime.so").unwrap();
    let vm = host.vm().unwrap();

    let err = vm.initialize(&[("KEY", "bad\0value")]).unwrap_err();
    assert!(matches!(err, HostError::InvalidString(_)));
    with_runtime(|rt| assert!(rt.properties.is_empty()));

    let domain = DomainHandle::from_raw(0x10 as *mut _);
    assert!(matches!(
        vm.open_assembly(domain, "/app/\0.dll"),
        Err(HostError::InvalidString(_))
    ));
    with_runtime(|rt| assert!(rt.opened.is_empty()));
}

#[test]
fn test_sessions_share_one_load() {
    let (loader, coordinator) = setup();
    let a = coordinator.acquire("/lib/libruntime.so").unwrap();
    let b = coordinator.acquire("/lib/libruntime.so").unwrap();

    let vm_a = a.vm().unwrap();
    let vm_b = b.vm().unwrap();
    with_runtime(|rt| rt.domain = 0xd0);
    assert_eq!(vm_a.start("a", NORMAL_VERSION).unwrap(), vm_b.start("b", NORMAL_VERSION).unwrap());
    assert_eq!(loader.loads(), 1);
}

#[test]
fn test_missing_runtime_library() {
    let err = monohost::make(Path::new("/definitely/not/here/libmonosgen-2.0.so")).unwrap_err();
    match err {
        HostError::FileNotFound { path } => {
            assert_eq!(path, Path::new("/definitely/not/here/libmonosgen-2.0.so"));
        }
        other => panic!("expected FileNotFound, got {other}"),
    }
    assert_eq!(Coordinator::global().status().reference_count, 0);
}
