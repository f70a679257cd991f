//! Pipeline-level properties: deterministic compilation, weak alias
//! transparency, and the comparison semantics of aggregate values.

use std::error::Error;
use std::mem;

use inkwell::context::Context;
use stela::diagnostics::BufferSink;
use stela::{compile, create_symbols, generate_ir, parse, tokenize};

fn ir_of(source: &str) -> Result<String, Box<dyn Error>> {
    let mut sink = BufferSink::new();
    let tokens = tokenize(source, &mut sink)?;
    let module = parse(&tokens, source, &mut sink)?;
    let symbols = create_symbols(vec![module], &mut sink)?;
    let context = Context::create();
    let ir = generate_ir(&context, &symbols, &mut sink)?;
    Ok(ir.print_to_string().to_string())
}

#[test]
fn deterministic_compilation() -> Result<(), Box<dyn Error>> {
    let source = r#"
        type Pair = struct { a: sint; b: [real]; };
        var history: [Pair] = [];
        extern func record(a: sint) {
            push_back(history, make Pair {a, [1.0, 2.0]});
        }
        extern func count() -> uint { return size(history); }
    "#;
    assert_eq!(ir_of(source)?, ir_of(source)?);
    Ok(())
}

#[test]
fn weak_alias_transparency() -> Result<(), Box<dyn Error>> {
    // substituting a weak alias for its target produces identical IR
    let aliased = r#"
        type Number = sint;
        extern func twice(v: Number) -> Number { return v + v; }
    "#;
    let plain = r#"
        type Number = sint;
        extern func twice(v: sint) -> sint { return v + v; }
    "#;
    assert_eq!(ir_of(aliased)?, ir_of(plain)?);
    Ok(())
}

#[test]
fn struct_equality_is_field_wise() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let mut sink = BufferSink::new();
    let engine = compile(
        &context,
        &[r#"
        type Vec2 = struct { x: sint; y: sint; };
        extern func eq(ax: sint, ay: sint, bx: sint, by: sint) -> bool {
            return make Vec2 {ax, ay} == make Vec2 {bx, by};
        }
        "#],
        &mut sink,
    )?;
    let eq: extern "C" fn(i32, i32, i32, i32) -> u8 =
        unsafe { mem::transmute(engine.address_of("eq")?) };
    assert_eq!(eq(1, 2, 1, 2), 1);
    assert_eq!(eq(1, 2, 1, 3), 0);
    assert_eq!(eq(0, 2, 1, 2), 0);
    Ok(())
}

#[test]
fn array_ordering_is_lexicographic() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let mut sink = BufferSink::new();
    let engine = compile(
        &context,
        &[r#"
        func prefix(n: uint) -> [uint] {
            var out: [uint] = [];
            for (i := 0u; i != n; i = i + 1u) push_back(out, i);
            return out;
        }
        extern func shorter_prefix_wins(a: uint, b: uint) -> bool {
            return prefix(a) < prefix(b);
        }
        extern func content_order() -> bool {
            return [1u, 2u, 3u] < [1u, 2u, 4u];
        }
        extern func equal_not_less() -> bool {
            return [1u, 2u] < [1u, 2u];
        }
        "#],
        &mut sink,
    )?;
    let shorter: extern "C" fn(u32, u32) -> u8 =
        unsafe { mem::transmute(engine.address_of("shorter_prefix_wins")?) };
    assert_eq!(shorter(2, 3), 1);
    assert_eq!(shorter(3, 2), 0);
    assert_eq!(shorter(3, 3), 0);

    let content: extern "C" fn() -> u8 =
        unsafe { mem::transmute(engine.address_of("content_order")?) };
    assert_eq!(content(), 1);

    let equal: extern "C" fn() -> u8 =
        unsafe { mem::transmute(engine.address_of("equal_not_less")?) };
    assert_eq!(equal(), 0);
    Ok(())
}

#[test]
fn refcounts_conserved_across_scopes() -> Result<(), Box<dyn Error>> {
    // a shared array's refcount returns to its pre-call value after a
    // function that copies it into locals and lets them go out of scope
    let context = Context::create();
    let mut sink = BufferSink::new();
    let engine = compile(
        &context,
        &[r#"
        var shared: [sint] = [1, 2, 3];

        extern func churn() {
            copy1 := shared;
            {
                copy2 := copy1;
                copy3 := copy2;
                var i = copy3[0];
                i++;
            }
        }

        extern func get_shared() -> [sint] {
            return shared;
        }
        "#],
        &mut sink,
    )?;

    let churn: extern "C" fn() = unsafe { mem::transmute(engine.address_of("churn")?) };
    let get_shared: extern "C" fn() -> *const i64 =
        unsafe { mem::transmute(engine.address_of("get_shared")?) };

    // the handle points at the packed header {i64 refcount, ...}; the
    // returned handle is a retained copy the host now owns
    let handle = get_shared();
    let before = unsafe { handle.read_unaligned() };
    churn();
    churn();
    let after = unsafe { handle.read_unaligned() };
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn default_closures_are_falsey() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let mut sink = BufferSink::new();
    let engine = compile(
        &context,
        &[r#"
        extern func default_is_false() -> bool {
            var f: func(sint) -> sint;
            return make bool f;
        }
        extern func bound_is_true() -> bool {
            var f: func(sint) -> sint;
            f = func(v: sint) -> sint { return v; };
            return make bool f;
        }
        "#],
        &mut sink,
    )?;
    let falsey: extern "C" fn() -> u8 =
        unsafe { mem::transmute(engine.address_of("default_is_false")?) };
    assert_eq!(falsey(), 0);
    let truthy: extern "C" fn() -> u8 =
        unsafe { mem::transmute(engine.address_of("bound_is_true")?) };
    assert_eq!(truthy(), 1);
    Ok(())
}

#[test]
fn unused_symbol_warning_does_not_stop_compilation() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let mut sink = BufferSink::new();
    let engine = compile(
        &context,
        &[r#"
        extern func answer() -> sint {
            let unused = 99;
            return 42;
        }
        "#],
        &mut sink,
    )?;
    assert!(sink.warnings().any(|d| d.message.contains("unused")
        || d.message.contains("Unused")));
    let answer: extern "C" fn() -> i32 =
        unsafe { mem::transmute(engine.address_of("answer")?) };
    assert_eq!(answer(), 42);
    Ok(())
}
