//! Property-based tests for the RNG state legalization.
//!
//! Covers:
//! - Sequential state semantics for arbitrary seeds and deltas
//! - Bit-exact packing for every word size that fits the counter
//! - Wraparound modulo 2^128
//! - Lowering preserves evaluation results and final counter state

use hlo_arith::interp::Interpreter;
use hlo_arith::ir::mask_for_bits;
use hlo_arith::parser::parse;
use hlo_arith::{legalize_to_arithmetic, LowerConfig, Module};
use proptest::prelude::*;

fn lowered(text: &str, config: &LowerConfig) -> Module {
    let mut module = parse(text).expect("generated module should parse");
    legalize_to_arithmetic(&mut module, config).expect("generated module should legalize");
    module
}

fn single_call(elem: &str, count: u64) -> String {
    format!(
        "func.func @main(%d: i64) {{\n  %r = mhlo.rng_get_and_update_state %d : tensor<{}x{}>\n  func.return %r\n}}\n",
        count, elem
    )
}

fn decode(elems: &[u128], word: u32) -> u128 {
    elems.iter().fold(0u128, |acc, &e| if word >= 128 { e } else { (acc << word) | e })
}

// =============================================================================
// State semantics
// =============================================================================

proptest! {
    /// Property: outputs see S, then S + d1; the counter ends at S + d1 + d2.
    #[test]
    fn prop_sequential_state(seed in any::<u128>(), d1 in any::<u64>(), d2 in any::<u64>()) {
        let text = "func.func @main(%a: i64, %b: i64) {\n  \
                    %x = mhlo.rng_get_and_update_state %a : tensor<2xui64>\n  \
                    %y = mhlo.rng_get_and_update_state %b : tensor<2xui64>\n  \
                    func.return %x, %y\n}\n";
        let config = LowerConfig::default().with_seed(seed);
        let module = lowered(text, &config);
        let mut interp = Interpreter::with_config(&module, &config);
        let out = interp.call_ints("main", &[d1 as u128, d2 as u128]).unwrap();

        prop_assert_eq!(decode(out[0].as_elems().unwrap(), 64), seed);
        prop_assert_eq!(decode(out[1].as_elems().unwrap(), 64), seed.wrapping_add(d1 as u128));
        prop_assert_eq!(
            interp.global("rng_state"),
            Some(seed.wrapping_add(d1 as u128).wrapping_add(d2 as u128))
        );
    }

    /// Property: the counter wraps modulo 2^128.
    #[test]
    fn prop_wraparound(below_max in 0u128..1024, delta in any::<u64>()) {
        let module = lowered(&single_call("i64", 2), &LowerConfig::default());
        let start = u128::MAX - below_max;
        let mut interp = Interpreter::new(&module);
        interp.set_global("rng_state", start).unwrap();
        interp.call_ints("main", &[delta as u128]).unwrap();
        prop_assert_eq!(interp.global("rng_state"), Some(start.wrapping_add(delta as u128)));
    }
}

// =============================================================================
// Packing
// =============================================================================

fn word_and_count() -> impl Strategy<Value = (u32, u64)> {
    prop::sample::select(vec![1u32, 7, 8, 16, 31, 32, 64, 128])
        .prop_flat_map(|word| (Just(word), 0..=(128 / word as u64).min(8)))
}

proptest! {
    /// Property: chunk i is bits [(n-1-i)*w, (n-i)*w) of the old value.
    #[test]
    fn prop_packing(value in any::<u128>(), (word, count) in word_and_count()) {
        let module = lowered(&single_call(&format!("ui{}", word), count), &LowerConfig::default());
        let mut interp = Interpreter::new(&module);
        interp.set_global("rng_state", value).unwrap();
        let out = interp.call_ints("main", &[0]).unwrap();
        let elems = out[0].as_elems().unwrap();

        prop_assert_eq!(elems.len() as u64, count);
        for (i, &elem) in elems.iter().enumerate() {
            let shift = (count - 1 - i as u64) as u32 * word;
            let expected = if shift >= 128 { 0 } else { (value >> shift) & mask_for_bits(word) };
            prop_assert_eq!(elem, expected);
        }
        // Packing reads the value before the update.
        prop_assert_eq!(interp.global("rng_state"), Some(value));
    }
}

// =============================================================================
// Lowering preserves semantics
// =============================================================================

#[derive(Debug, Clone)]
struct Call {
    delta_ty: &'static str,
    elem: String,
    count: u64,
}

fn call_strategy() -> impl Strategy<Value = Call> {
    let delta = prop::sample::select(vec!["i8", "si8", "ui16", "i32", "si32", "i64", "si64", "i128"]);
    let elem = (prop::sample::select(vec!["i", "si", "ui"]), prop::sample::select(vec![1u32, 8, 16, 32, 64]));
    (delta, elem)
        .prop_flat_map(|(delta_ty, (sign, word))| {
            (Just(delta_ty), Just(format!("{}{}", sign, word)), 0..=(128 / word as u64).min(4))
        })
        .prop_map(|(delta_ty, elem, count)| Call { delta_ty, elem, count })
}

fn module_text(calls: &[Call]) -> String {
    let params: Vec<String> = calls.iter().enumerate().map(|(i, c)| format!("%d{}: {}", i, c.delta_ty)).collect();
    let mut text = format!("module @generated {{\n  func.func @main({}) {{\n", params.join(", "));
    for (i, c) in calls.iter().enumerate() {
        text.push_str(&format!(
            "    %r{} = mhlo.rng_get_and_update_state %d{} : tensor<{}x{}>\n",
            i, i, c.count, c.elem
        ));
    }
    let results: Vec<String> = (0..calls.len()).map(|i| format!("%r{}", i)).collect();
    text.push_str(&format!("    func.return {}\n  }}\n}}\n", results.join(", ")));
    text
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: evaluating before and after lowering gives the same results
    /// and the same final counter.
    #[test]
    fn prop_lowering_preserves_semantics(
        calls in prop::collection::vec(call_strategy(), 1..5),
        args in prop::collection::vec(any::<u128>(), 5),
        seed in any::<u128>(),
        repeats in 1usize..4,
    ) {
        let text = module_text(&calls);
        let config = LowerConfig::default().with_seed(seed);
        let original = parse(&text).unwrap();
        let lowered_module = lowered(&text, &config);

        let args = &args[..calls.len()];
        let mut reference = Interpreter::with_config(&original, &config);
        let mut actual = Interpreter::with_config(&lowered_module, &config);
        for _ in 0..repeats {
            let expected = reference.call_ints("main", args).unwrap();
            let got = actual.call_ints("main", args).unwrap();
            prop_assert_eq!(expected, got);
        }
        prop_assert_eq!(reference.global("rng_state"), actual.global("rng_state"));
    }
}
