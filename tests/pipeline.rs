//! End-to-end pipeline tests: compile STELA source, JIT it and call the
//! external functions through their addresses.

use std::error::Error;
use std::mem;

use inkwell::context::Context;
use stela::diagnostics::BufferSink;
use stela::{compile, Engine};

fn build<'ctx>(context: &'ctx Context, source: &str) -> Result<Engine<'ctx>, Box<dyn Error>> {
    let mut sink = BufferSink::new();
    let engine = compile(context, &[source], &mut sink)?;
    Ok(engine)
}

#[test]
fn multiply_by_addition_loop() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func f(a: uint, b: uint) -> uint {
            var p = 0u;
            for (; a != 0u; a = a - 1u) p = p + b;
            return p;
        }
        "#,
    )?;
    let f: extern "C" fn(u32, u32) -> u32 = unsafe { mem::transmute(engine.address_of("f")?) };
    assert_eq!(f(6, 6), 36);
    assert_eq!(f(0, 5), 0);
    Ok(())
}

#[test]
fn recursive_factorial() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func fac(n: uint) -> uint {
            return n == 0u ? 1u : n * fac(n - 1u);
        }
        "#,
    )?;
    let fac: extern "C" fn(u32) -> u32 = unsafe { mem::transmute(engine.address_of("fac")?) };
    assert_eq!(fac(10), 3628800);
    Ok(())
}

#[test]
fn signed_identity() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func id(x: sint) -> sint {
            return x;
        }
        "#,
    )?;
    let id: extern "C" fn(i32) -> i32 = unsafe { mem::transmute(engine.address_of("id")?) };
    assert_eq!(id(-11), -11);
    assert_eq!(id(42), 42);
    Ok(())
}

#[test]
fn switch_dispatch() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func test(v: sint) -> real {
            switch (v) {
                case (0) { return 0.0; }
                case (1) { return 1.0; }
                default { return 3.0; }
            }
        }
        "#,
    )?;
    let test: extern "C" fn(i32) -> f32 = unsafe { mem::transmute(engine.address_of("test")?) };
    assert_eq!(test(0), 0.0);
    assert_eq!(test(1), 1.0);
    assert_eq!(test(5), 3.0);
    Ok(())
}

#[test]
fn switch_fallthrough_and_break() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func classify(v: uint) -> uint {
            value := 0u;
            switch (v) {
                case (0u) {
                    value += 1u;
                    continue;
                }
                case (1u) {
                    value += 2u;
                    break;
                }
                default { value += 10u; break; }
            }
            return value;
        }
        "#,
    )?;
    let classify: extern "C" fn(u32) -> u32 =
        unsafe { mem::transmute(engine.address_of("classify")?) };
    // case 0 falls through into case 1
    assert_eq!(classify(0), 3);
    assert_eq!(classify(1), 2);
    assert_eq!(classify(7), 10);
    Ok(())
}

/// The generated array header `{i64 refcount, i32 cap, i32 len, T* dat}`.
/// The packed layout matches the natural C layout for these field sizes.
#[repr(C)]
struct ArrayHeader {
    refcount: i64,
    cap: i32,
    len: i32,
    dat: *mut f32,
}

#[test]
fn array_select_refcounts() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func select(b: bool, a: [real]) -> [real] {
            return b ? a : make [real] {};
        }
        "#,
    )?;
    let select: extern "C" fn(u8, *mut ArrayHeader) -> *mut ArrayHeader =
        unsafe { mem::transmute(engine.address_of("select")?) };

    // an array handle owned by the host with refcount 1
    let input = Box::into_raw(Box::new(ArrayHeader {
        refcount: 1,
        cap: 0,
        len: 0,
        dat: std::ptr::null_mut(),
    }));

    let shared = select(1, input);
    assert_eq!(shared, input, "true branch returns the same handle");
    unsafe {
        assert_eq!((*input).refcount, 2, "the returned copy retains the input");
    }

    let fresh = select(0, input);
    assert_ne!(fresh, input, "false branch returns a new array");
    unsafe {
        assert_eq!((*input).refcount, 2, "the input is untouched");
        assert_eq!((*fresh).refcount, 1);
        assert_eq!((*fresh).len, 0);
    }
    Ok(())
}

#[test]
fn array_builtins_and_subscript() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func sum_squares(n: uint) -> uint {
            var values: [uint] = [];
            for (i := 0u; i != n; i = i + 1u) {
                push_back(values, i * i);
            }
            total := 0u;
            for (i := 0u; i != size(values); i = i + 1u) {
                total += values[i];
            }
            return total;
        }
        "#,
    )?;
    let sum: extern "C" fn(u32) -> u32 =
        unsafe { mem::transmute(engine.address_of("sum_squares")?) };
    assert_eq!(sum(0), 0);
    assert_eq!(sum(4), 0 + 1 + 4 + 9);
    Ok(())
}

#[test]
fn closures_capture_and_call() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        func apply(f: func(sint) -> sint, v: sint) -> sint {
            return f(v);
        }
        extern func added(x: sint, y: sint) -> sint {
            add_x := func(v: sint) -> sint { return v + x; };
            return apply(add_x, y);
        }
        "#,
    )?;
    let added: extern "C" fn(i32, i32) -> i32 =
        unsafe { mem::transmute(engine.address_of("added")?) };
    assert_eq!(added(30, 12), 42);
    assert_eq!(added(-5, 5), 0);
    Ok(())
}

#[test]
fn nested_closures_transitive_capture() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func curried_add(a: sint, b: sint, c: sint) -> sint {
            outer := func(x: sint) -> func(sint) -> sint {
                return func(y: sint) -> sint { return a + x + y; };
            };
            inner := outer(b);
            return inner(c);
        }
        "#,
    )?;
    let curried: extern "C" fn(i32, i32, i32) -> i32 =
        unsafe { mem::transmute(engine.address_of("curried_add")?) };
    assert_eq!(curried(1, 2, 3), 6);
    assert_eq!(curried(-7, 7, 11), 11);
    Ok(())
}

#[test]
fn structs_and_strong_aliases() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        type Rational = struct { n: sint; d: sint; };
        type Dir sint;

        func (self: Rational) scaled(by: sint) -> Rational {
            return make Rational {self.n * by, self.d * by};
        }

        extern func numerator(n: sint, d: sint, by: sint) -> sint {
            r := make Rational {n, d};
            return r.scaled(by).n;
        }

        extern func round_trip(v: sint) -> sint {
            d := make Dir v;
            return make sint d;
        }
        "#,
    )?;
    let numerator: extern "C" fn(i32, i32, i32) -> i32 =
        unsafe { mem::transmute(engine.address_of("numerator")?) };
    assert_eq!(numerator(2, 3, 5), 10);

    let round_trip: extern "C" fn(i32) -> i32 =
        unsafe { mem::transmute(engine.address_of("round_trip")?) };
    assert_eq!(round_trip(-3), -3);
    Ok(())
}

#[test]
fn globals_run_constructors() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        var table: [sint] = [3, 1, 4, 1, 5];
        let offset = 10;

        extern func lookup(i: sint) -> sint {
            return table[i] + offset;
        }
        "#,
    )?;
    let lookup: extern "C" fn(i32) -> i32 =
        unsafe { mem::transmute(engine.address_of("lookup")?) };
    assert_eq!(lookup(0), 13);
    assert_eq!(lookup(2), 14);
    Ok(())
}

#[test]
fn imports_across_modules() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let mut sink = BufferSink::new();
    let engine = compile(
        &context,
        &[
            r#"
            module math;
            extern func double_it(v: sint) -> sint { return v * 2; }
            "#,
            r#"
            import math;
            extern func quadruple(v: sint) -> sint {
                return double_it(double_it(v));
            }
            "#,
        ],
        &mut sink,
    )?;
    let quadruple: extern "C" fn(i32) -> i32 =
        unsafe { mem::transmute(engine.address_of("quadruple")?) };
    assert_eq!(quadruple(11), 44);
    Ok(())
}

#[test]
fn redefinition_is_fatal_at_second_declaration() {
    let context = Context::create();
    let mut sink = BufferSink::new();
    let result = compile(&context, &["func f() {}\nfunc f() {}"], &mut sink);
    let Err(stela::Error::Semantic(err)) = result else {
        panic!("expected a semantic error");
    };
    // reported at the second declaration's location, on line 2
    assert_eq!(err.span().start.0, 1);
    assert!(sink.errors().count() >= 1);
}

#[test]
fn string_literals_are_char_arrays() -> Result<(), Box<dyn Error>> {
    let context = Context::create();
    let engine = build(
        &context,
        r#"
        extern func third_letter() -> char {
            word := "yeah";
            return word[2];
        }
        extern func word_len() -> uint {
            return size("hello");
        }
        "#,
    )?;
    let third: extern "C" fn() -> u8 =
        unsafe { mem::transmute(engine.address_of("third_letter")?) };
    assert_eq!(third(), b'a');
    let len: extern "C" fn() -> u32 = unsafe { mem::transmute(engine.address_of("word_len")?) };
    assert_eq!(len(), 5);
    Ok(())
}
