//! Binary round-trip properties of the codec.

use wasmith::WasmFile;

fn assemble(source: &str) -> WasmFile {
    wasmith::assemble_str(source).expect("assembly should succeed")
}

/// Encode, decode, re-encode: the bytes and the structure must both
/// survive.
fn round_trip(file: &WasmFile) {
    let encoded = file.to_vec().expect("encoding should succeed");
    let decoded = WasmFile::from_buffer(&encoded).expect("decoding should succeed");
    assert_eq!(&decoded, file, "structural equality after a round trip");
    let re_encoded = decoded.to_vec().expect("re-encoding should succeed");
    assert_eq!(re_encoded, encoded, "byte equality after a round trip");
}

#[test]
fn empty_module_is_eight_bytes() {
    let file = assemble("(module)");
    let encoded = file.to_vec().unwrap();
    assert_eq!(encoded, [0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00]);
    round_trip(&file);
}

#[test]
fn every_section_kind_round_trips() {
    let file = assemble(
        r#"
        (module $everything
            (type $void (func))
            (type $binop (func (param i32 i32) (result i32)))
            (import "spectest" "print_i32" (func $print (param i32)))
            (import "spectest" "global_i32" (global $g i32))
            (memory (export "mem") 1 2)
            (table 4 8 anyfunc)
            (global $mut (mut i64) (i64.const -1))
            (global $imm f64 (f64.const 2.5))
            (func $id (type $binop) (param i32 i32) (result i32)
                get_local 0)
            (func $main
                i32.const 42
                call $print)
            (export "main" (func $main))
            (start $main)
            (elem (i32.const 0) $id $id)
            (data (i32.const 8) "section soup"))
        "#,
    );
    round_trip(&file);
}

#[test]
fn instruction_soup_round_trips() {
    let file = assemble(
        r#"
        (module
            (memory 1)
            (func (param i32 f64) (result i32) (local i64 f32)
                block $exit (result i32)
                    loop $again
                        get_local 0
                        br_if $exit
                        br $again
                    end
                    i32.const 0
                end
                if (result i32)
                    i32.const 1
                else
                    i32.const 0
                end
                get_local 0
                i32.load offset=16
                i32.add
                block
                    i32.const 3
                    br_table 0 0 0
                end
                get_local 1
                f64.sqrt
                i32.trunc_s/f64
                i32.add))
        "#,
    );
    round_trip(&file);
}

#[test]
fn float_payload_bits_survive() {
    let file = assemble(
        r#"
        (module
            (func (result f64) f64.const nan:0xdeadbeef)
            (func (result f32) f32.const -nan:0x200001)
            (func (result f64) f64.const -0x1.fffffffffffffp+1023))
        "#,
    );
    round_trip(&file);

    let encoded = file.to_vec().unwrap();
    let decoded = WasmFile::from_buffer(&encoded).unwrap();
    let bodies = decoded.code_section().unwrap().bodies();
    assert_eq!(
        bodies[0].code()[0],
        wasmith::ops::Instruction::F64Const(0x7ff0_0000_dead_beef)
    );
    assert_eq!(
        bodies[1].code()[0],
        wasmith::ops::Instruction::F32Const(0xffa0_0001)
    );
    assert_eq!(
        bodies[2].code()[0],
        wasmith::ops::Instruction::F64Const(f64::MIN.to_bits())
    );
}

#[test]
fn unknown_and_custom_sections_are_preserved() {
    // An empty module with a custom section squeezed between two
    // hand-written known sections.
    let mut bytes = vec![0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00];
    // Type section: one type, () -> ().
    bytes.extend_from_slice(&[0x01, 0x04, 0x01, 0x60, 0x00, 0x00]);
    // Custom section named "x" with payload [0xAA].
    bytes.extend_from_slice(&[0x00, 0x03, 0x01, b'x', 0xaa]);
    // Function + code sections for one empty function of type 0.
    bytes.extend_from_slice(&[0x03, 0x02, 0x01, 0x00]);
    bytes.extend_from_slice(&[0x0a, 0x04, 0x01, 0x02, 0x00, 0x0b]);

    let file = WasmFile::from_buffer(&bytes).expect("decoding should succeed");
    assert_eq!(file.to_vec().unwrap(), bytes, "byte-exact round trip");

    // The custom section kept its position between the type and function
    // sections.
    let codes: Vec<u8> = file.sections().iter().map(|s| s.code()).collect();
    assert_eq!(codes, vec![1, 0, 3, 10]);
}

#[test]
fn name_section_round_trips() {
    let file = assemble("(module $tool (func $noop))");
    round_trip(&file);
    let encoded = file.to_vec().unwrap();
    let decoded = WasmFile::from_buffer(&encoded).unwrap();
    assert_eq!(decoded.module_name(), Some("tool"));
}

#[test]
fn section_length_mismatch_is_rejected() {
    use assert_matches::assert_matches;

    // Type section claims 10 payload bytes but the stream ends.
    let bytes = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, 0x01, 0x0a, 0x01,
    ];
    assert_matches!(WasmFile::from_buffer(&bytes), Err(wasmith::Error::Encoding(_)));
}

#[test]
fn trailing_garbage_in_function_body_is_rejected() {
    // One function whose body size is larger than its actual code.
    let bytes = [
        0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
        0x01, 0x04, 0x01, 0x60, 0x00, 0x00, // type section
        0x03, 0x02, 0x01, 0x00, // function section
        0x0a, 0x05, 0x01, 0x03, 0x00, 0x0b, 0x00, // code section, 1 junk byte
    ];
    assert!(WasmFile::from_buffer(&bytes).is_err());
}
