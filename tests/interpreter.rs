//! End-to-end interpreter scenarios.

use wasmith::memory_units::Pages;
use wasmith::{
    Error, ImportsBuilder, ModuleInstance, ModuleRef, NopExternals, RunnerConfig, RuntimeValue,
    SpecTestImporter, TrapCode,
};

fn instantiate(source: &str) -> ModuleRef {
    let file = wasmith::assemble_str(source).expect("assembly should succeed");
    ModuleInstance::new(&file, &ImportsBuilder::default())
        .expect("instantiation should succeed")
        .assert_no_start()
}

fn expect_trap(result: Result<Option<RuntimeValue>, Error>, code: TrapCode) {
    match result {
        Err(Error::Trap(trap)) => assert_eq!(trap.code(), Some(code)),
        other => panic!("expected a {:?} trap, got {:?}", code, other),
    }
}

#[test]
fn memory_size_after_instantiation() {
    let instance = instantiate(r#"(module (memory $m (limits 1 1)) (export "m" (memory $m)))"#);
    let memory = instance
        .export_by_name("m")
        .unwrap()
        .as_memory()
        .cloned()
        .unwrap();
    assert_eq!(memory.current_size(), Pages(1));
}

#[test]
fn factorial_of_ten() {
    let instance = instantiate(
        r#"
        (module
            (func $fac (export "fac") (param $n i64) (result i64)
                (if (result i64) (i64.eqz (get_local $n))
                    (then (i64.const 1))
                    (else
                        (i64.mul
                            (get_local $n)
                            (call $fac (i64.sub (get_local $n) (i64.const 1))))))))
        "#,
    );
    assert_eq!(
        instance
            .invoke_export("fac", &[RuntimeValue::I64(10)], &mut NopExternals)
            .unwrap(),
        Some(RuntimeValue::I64(3628800))
    );
}

#[test]
fn start_function_divide_by_zero_traps() {
    let file = wasmith::assemble_str(
        r#"
        (module
            (func $boom (result i32)
                i32.const 1
                i32.const 0
                i32.div_s)
            (func $start
                call $boom
                drop)
            (start $start))
        "#,
    )
    .unwrap();
    let not_started = ModuleInstance::new(&file, &ImportsBuilder::default()).unwrap();
    let trap = not_started.run_start(&mut NopExternals).unwrap_err();
    assert!(trap.to_string().contains("integer divide by zero"));
}

#[test]
fn grow_memory_returns_previous_size_or_sentinel() {
    let instance = instantiate(
        r#"
        (module
            (memory 1 2)
            (func (export "grow") (param i32) (result i32)
                get_local 0
                grow_memory)
            (func (export "size") (result i32)
                current_memory))
        "#,
    );
    let grow = |by: i32, instance: &ModuleRef| {
        instance
            .invoke_export("grow", &[RuntimeValue::I32(by)], &mut NopExternals)
            .unwrap()
    };
    assert_eq!(grow(1, &instance), Some(RuntimeValue::I32(1)));
    assert_eq!(grow(1, &instance), Some(RuntimeValue::I32(-1)));
    assert_eq!(
        instance
            .invoke_export("size", &[], &mut NopExternals)
            .unwrap(),
        Some(RuntimeValue::I32(2))
    );
}

#[test]
fn little_endian_views() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "poke32") (param i32 i32)
                get_local 0
                get_local 1
                i32.store)
            (func (export "peek8u") (param i32) (result i32)
                get_local 0
                i32.load8_u)
            (func (export "peek8s") (param i32) (result i32)
                get_local 0
                i32.load8_s))
        "#,
    );
    instance
        .invoke_export(
            "poke32",
            &[RuntimeValue::I32(16), RuntimeValue::I32(0x1234_80ff_u32 as i32)],
            &mut NopExternals,
        )
        .unwrap();
    let peek = |export: &str, addr: i32| {
        instance
            .invoke_export(export, &[RuntimeValue::I32(addr)], &mut NopExternals)
            .unwrap()
    };
    // Least significant byte first.
    assert_eq!(peek("peek8u", 16), Some(RuntimeValue::I32(0xff)));
    assert_eq!(peek("peek8u", 17), Some(RuntimeValue::I32(0x80)));
    assert_eq!(peek("peek8s", 17), Some(RuntimeValue::I32(-128)));
    assert_eq!(peek("peek8u", 19), Some(RuntimeValue::I32(0x12)));
}

#[test]
fn out_of_bounds_access_traps() {
    let instance = instantiate(
        r#"
        (module
            (memory 1)
            (func (export "load") (param i32) (result i64)
                get_local 0
                i64.load))
        "#,
    );
    expect_trap(
        instance.invoke_export("load", &[RuntimeValue::I32(65529)], &mut NopExternals),
        TrapCode::MemoryAccessOutOfBounds,
    );
    expect_trap(
        instance.invoke_export("load", &[RuntimeValue::I32(-1)], &mut NopExternals),
        TrapCode::MemoryAccessOutOfBounds,
    );
    // The last full word is fine.
    assert!(instance
        .invoke_export("load", &[RuntimeValue::I32(65528)], &mut NopExternals)
        .is_ok());
}

#[test]
fn call_indirect_checks_signatures() {
    let instance = instantiate(
        r#"
        (module
            (type $i2i (func (param i32) (result i32)))
            (table 3 anyfunc)
            (elem (i32.const 0) $double $wrong)
            (func $double (param i32) (result i32)
                get_local 0
                i32.const 2
                i32.mul)
            (func $wrong (param i64) (result i64)
                get_local 0)
            (func (export "dispatch") (param i32 i32) (result i32)
                get_local 1
                get_local 0
                call_indirect (type $i2i)))
        "#,
    );
    let dispatch = |slot: i32, arg: i32| {
        instance.invoke_export(
            "dispatch",
            &[RuntimeValue::I32(slot), RuntimeValue::I32(arg)],
            &mut NopExternals,
        )
    };
    assert_eq!(dispatch(0, 21).unwrap(), Some(RuntimeValue::I32(42)));
    expect_trap(dispatch(1, 0), TrapCode::UnexpectedSignature);
    expect_trap(dispatch(2, 0), TrapCode::ElemUninitialized);
    expect_trap(dispatch(3, 0), TrapCode::TableAccessOutOfBounds);
}

#[test]
fn call_stack_limit_is_configurable() {
    let instance = instantiate(
        r#"
        (module
            (func $down (export "down") (param i32) (result i32)
                (if (result i32) (i32.eqz (get_local 0))
                    (then (i32.const 0))
                    (else (call $down (i32.sub (get_local 0) (i32.const 1)))))))
        "#,
    );
    // Fits under the default ceiling of 256 frames.
    assert!(instance
        .invoke_export("down", &[RuntimeValue::I32(200)], &mut NopExternals)
        .is_ok());
    // A tighter policy traps earlier.
    let result = instance.invoke_export_configured(
        "down",
        &[RuntimeValue::I32(200)],
        &mut NopExternals,
        RunnerConfig::with_call_stack_limit(64),
    );
    match result {
        Err(Error::Trap(trap)) => {
            assert!(trap.to_string().contains("call stack exhausted"))
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[test]
fn spectest_print_runs_as_import() {
    let file = wasmith::assemble_str(
        r#"
        (module
            (import "spectest" "print_i32" (func $print (param i32)))
            (func (export "noisy") (result i32)
                i32.const 7
                call $print
                i32.const 7))
        "#,
    )
    .unwrap();
    let mut spectest = SpecTestImporter::new();
    let instance = {
        let imports = ImportsBuilder::new().with_resolver("spectest", &spectest);
        ModuleInstance::new(&file, &imports)
            .unwrap()
            .assert_no_start()
    };
    assert_eq!(
        instance
            .invoke_export("noisy", &[], &mut spectest)
            .unwrap(),
        Some(RuntimeValue::I32(7))
    );
}

#[test]
fn globals_and_reentrancy() {
    let instance = instantiate(
        r#"
        (module
            (global $acc (mut i32) (i32.const 0))
            (func (export "bump") (param i32) (result i32)
                get_global $acc
                get_local 0
                i32.add
                set_global $acc
                get_global $acc))
        "#,
    );
    let bump = |by: i32| {
        instance
            .invoke_export("bump", &[RuntimeValue::I32(by)], &mut NopExternals)
            .unwrap()
    };
    assert_eq!(bump(5), Some(RuntimeValue::I32(5)));
    // A trap in one invocation leaves the instance usable and its state
    // intact.
    assert_eq!(bump(2), Some(RuntimeValue::I32(7)));
}

#[test]
fn tee_local_peephole_scenario() {
    use wasmith::ops::Instruction;
    use wasmith::optimize::PeepholeOptimizer;

    let mut body = vec![
        Instruction::SetLocal(3),
        Instruction::GetLocal(3),
        Instruction::I32Const(5),
    ];
    PeepholeOptimizer::default().rewrite(&mut body);
    assert_eq!(
        body,
        vec![Instruction::TeeLocal(3), Instruction::I32Const(5)]
    );
}

#[test]
fn optimized_module_behaves_identically() {
    let source = r#"
        (module
            (type $a (func (param i64) (result i64)))
            (type $b (func (param i64) (result i64)))
            (table 1 anyfunc)
            (elem (i32.const 0) $fac)
            (func $fac (type $a) (param $n i64) (result i64) (local $tmp i64)
                (if (result i64) (i64.le_s (get_local $n) (i64.const 1))
                    (then (i64.const 1))
                    (else
                        (set_local $tmp (i64.sub (get_local $n) (i64.const 1)))
                        (get_local $tmp)
                        (call_indirect (type $b) (i32.const 0))
                        (i64.mul (get_local $n)))))
            (func (export "run") (param i64) (result i64)
                get_local 0
                call $fac))
    "#;
    let mut file = wasmith::assemble_str(source).unwrap();
    let plain = ModuleInstance::new(&file, &ImportsBuilder::default())
        .unwrap()
        .assert_no_start();
    let before = plain
        .invoke_export("run", &[RuntimeValue::I64(12)], &mut NopExternals)
        .unwrap();

    file.optimize();
    let optimized = ModuleInstance::new(&file, &ImportsBuilder::default())
        .unwrap()
        .assert_no_start();
    let after = optimized
        .invoke_export("run", &[RuntimeValue::I64(12)], &mut NopExternals)
        .unwrap();

    assert_eq!(before, after);
    assert_eq!(before, Some(RuntimeValue::I64(479001600)));
    // The duplicate function type was folded away.
    assert_eq!(file.type_section().unwrap().types().len(), 1);
}
