//! End-to-end loop access analysis tests.

use prism_loop_access::ir::{AccessFlags, BlockId, Function, FunctionBuilder, LoopId, MemType, ValueId};
use prism_loop_access::scev::Poly;
use prism_loop_access::{
    AccessError, AnalysisContext, BasicAliasAnalysis, LoopAccessAnalysis, LoopAccessInfo, MemoryOpViolation,
    ShapeViolation, SymbolicStrides, Verdict, VectorizerParams,
};

fn analyze_with(f: &Function, lp: LoopId, strides: &SymbolicStrides, params: &VectorizerParams) -> String {
    let aa = BasicAliasAnalysis::new(f);
    let cx = AnalysisContext::new(f, &aa);
    LoopAccessInfo::new(cx, lp, strides, params).to_string()
}

/// Run `check` on the summary of `lp`.
fn with_info<R>(
    f: &Function,
    lp: LoopId,
    strides: &SymbolicStrides,
    params: &VectorizerParams,
    check: impl FnOnce(&LoopAccessInfo<'_>) -> R,
) -> R {
    let aa = BasicAliasAnalysis::new(f);
    let cx = AnalysisContext::new(f, &aa);
    let info = LoopAccessInfo::new(cx, lp, strides, params);
    check(&info)
}

fn default_info<R>(f: &Function, lp: LoopId, check: impl FnOnce(&LoopAccessInfo<'_>) -> R) -> R {
    with_info(f, lp, &SymbolicStrides::default(), &VectorizerParams::default(), check)
}

/// `for (i = 0; i < 100; i++) dst[i + write_off] = src[i + read_off]`
/// over one `noalias` i32 array.
fn copy_within(read_off: i64, write_off: i64) -> (Function, LoopId) {
    let mut b = FunctionBuilder::new("copy");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let a = b.noalias_array("a", MemType::I32);
    let src = b.strided(a, lp, 1, read_off);
    let dst = b.strided(a, lp, 1, write_off);
    b.load(body, src);
    b.compute(body);
    b.store(body, dst);
    (b.finish(), lp)
}

fn error_of(info: &LoopAccessInfo<'_>) -> Option<AccessError> {
    info.report().map(|r| r.error.clone())
}

// =============================================================================
// Trivially Safe Loops
// =============================================================================

#[test]
fn test_read_only_loop_is_safe() {
    let mut b = FunctionBuilder::new("sum");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let p = b.argument("p", MemType::F32);
    let q = b.argument("q", MemType::F32);
    let pp = b.strided(p, lp, 1, 0);
    let gather = b.indirect(q);
    b.load(body, pp);
    b.load(body, gather);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert_eq!(info.num_loads(), 2);
        assert_eq!(info.num_stores(), 0);
        assert!(info.report().is_none());
    });
}

#[test]
fn test_write_only_loop_is_safe_for_any_stride() {
    let mut b = FunctionBuilder::new("fill");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let p = b.argument("p", MemType::I64);
    let every_third = b.strided(p, lp, 3, 0);
    b.store(body, every_third);
    b.store(body, every_third);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert_eq!(info.num_stores(), 2);
    });
}

#[test]
fn test_parallel_loop_skips_dependence_checks() {
    // p[idx[i]] = p[i]
    let mut b = FunctionBuilder::new("scatter");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let p = b.argument("p", MemType::I32);
    let src = b.strided(p, lp, 1, 0);
    let dst = b.indirect(p);
    b.load(body, src);
    b.store(body, dst);
    b.mark_parallel(lp);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert!(info.runtime_check().is_none());
    });
}

// =============================================================================
// Dependences Within One Array
// =============================================================================

#[test]
fn test_backward_read_is_safe() {
    // a[i] = a[i + 1]
    let (f, lp) = copy_within(1, 0);
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert_eq!(info.max_safe_dep_dist_bytes(), u64::MAX);
    });
}

#[test]
fn test_loop_carried_forward_dependence_is_unsafe() {
    // a[i + 1] = a[i]
    let (f, lp) = copy_within(0, 1);
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CannotVectorize);
        assert_eq!(error_of(info), Some(AccessError::UnsafeDependence));
        assert_eq!(info.to_string(), "Report: unsafe dependent memory operations in loop\n\n");
    });
}

#[test]
fn test_distant_forward_dependence_limits_width() {
    // a[i + 16] = a[i]
    let (f, lp) = copy_within(0, 16);
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert_eq!(info.max_safe_dep_dist_bytes(), 64);
        assert_eq!(info.to_string(), "Memory dependences are safe\n\n");
    });
}

#[test]
fn test_width_two_dependence() {
    // a[i + 2] = a[i]
    let (f, lp) = copy_within(0, 2);
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert_eq!(info.max_safe_dep_dist_bytes(), 8);
    });
}

#[test]
fn test_store_load_forwarding_hazard_is_unsafe() {
    // a[i + 3] = a[i]: 12 bytes apart, no vector width forwards cleanly.
    let (f, lp) = copy_within(0, 3);
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CannotVectorize);
        assert_eq!(error_of(info), Some(AccessError::UnsafeDependence));
    });
}

#[test]
fn test_forced_width_rejects_short_distance() {
    let (f, lp) = copy_within(0, 16);
    let params = VectorizerParams::new()
        .with_force_vector_width(16)
        .with_force_vector_interleave(2);
    with_info(&f, lp, &SymbolicStrides::default(), &params, |info| {
        assert_eq!(info.verdict(), Verdict::CannotVectorize);
    });
}

#[test]
fn test_read_modify_write_is_safe() {
    // a[i] += 1
    let (f, lp) = copy_within(0, 0);
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert!(!info.runtime_pointer_check().need);
    });
}

// =============================================================================
// Runtime Checks
// =============================================================================

/// `q[i] = p[i]` where `p` and `q` may overlap.
fn may_alias_copy() -> (Function, LoopId, ValueId, ValueId, ValueId, ValueId) {
    let mut b = FunctionBuilder::new("copy");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let p = b.argument("p", MemType::I32);
    let q = b.argument("q", MemType::I32);
    let pp = b.strided(p, lp, 1, 0);
    let pq = b.strided(q, lp, 1, 0);
    b.load(body, pp);
    b.store(body, pq);
    (b.finish(), lp, p, q, pp, pq)
}

#[test]
fn test_may_alias_arguments_need_runtime_check() {
    let (f, lp, p, q, pp, pq) = may_alias_copy();
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithRuntimeChecks);

        let rt = info.runtime_pointer_check();
        assert!(rt.need);
        assert_eq!(rt.len(), 2);
        assert_eq!(rt.check_pairs(), vec![(0, 1)]);
        assert_eq!(rt.entries()[0].ptr, pq);
        assert!(rt.entries()[0].is_write);
        assert_eq!(rt.entries()[1].ptr, pp);

        let plan = info.runtime_check().unwrap();
        assert_eq!(plan.bounds.len(), 2);
        assert_eq!(plan.conflicts.len(), 1);

        // Each range covers 100 i32 elements: 396 bytes past its start.
        let apart = |v: ValueId| Some(if v == p { 0x1000 } else if v == q { 0x2000 } else { 0 });
        let overlapping = |v: ValueId| Some(if v == p { 0x1000 } else if v == q { 0x1100 } else { 0 });
        assert_eq!(plan.any_conflict(&apart), Some(false));
        assert_eq!(plan.any_conflict(&overlapping), Some(true));

        let expect = format!(
            "Memory dependences are safe with run-time checks\nRun-time memory checks:\n0:\n  {}\n  {}\n\n",
            f.value_name(pq),
            f.value_name(pp)
        );
        assert_eq!(info.to_string(), expect);
    });
}

/// Stores to `writes` arguments and loads from `reads` arguments, all of
/// which may alias.
fn many_arguments(writes: usize, reads: usize) -> (Function, LoopId) {
    let mut b = FunctionBuilder::new("many");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    for i in 0..reads {
        let arg = b.argument(&format!("in{i}"), MemType::F64);
        let ptr = b.strided(arg, lp, 1, 0);
        b.load(body, ptr);
    }
    for i in 0..writes {
        let arg = b.argument(&format!("out{i}"), MemType::F64);
        let ptr = b.strided(arg, lp, 1, 0);
        b.store(body, ptr);
    }
    (b.finish(), lp)
}

#[test]
fn test_too_many_runtime_checks() {
    // 3 writes * (2 reads + 3 writes - 1) = 12 comparisons
    let (f, lp) = many_arguments(3, 2);
    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CannotVectorize);
        assert_eq!(
            error_of(info),
            Some(AccessError::TooManyRuntimeChecks {
                comparisons: 12,
                threshold: 8,
            })
        );
        assert!(info.runtime_pointer_check().is_empty());
        assert!(info.runtime_check().is_none());
    });
}

#[test]
fn test_raised_threshold_allows_runtime_checks() {
    let (f, lp) = many_arguments(3, 2);
    let params = VectorizerParams::new().with_runtime_memory_check_threshold(12);
    with_info(&f, lp, &SymbolicStrides::default(), &params, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithRuntimeChecks);
        let rt = info.runtime_pointer_check();
        assert_eq!(rt.len(), 5);
        // Read pairs are never compared.
        assert!(rt
            .check_pairs()
            .iter()
            .all(|&(i, j)| rt.entries()[i].is_write || rt.entries()[j].is_write));
        assert_eq!(rt.check_pairs().len(), 9);
    });
}

#[test]
fn test_disjoint_arrays_need_no_checks() {
    let mut b = FunctionBuilder::new("copy");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let src = b.noalias_array("src", MemType::I32);
    let dst = b.global("dst", MemType::I32);
    let ps = b.strided(src, lp, 1, 0);
    let pd = b.strided(dst, lp, 1, 0);
    b.load(body, ps);
    b.store(body, pd);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert!(info.runtime_pointer_check().check_pairs().is_empty());
    });
}

#[test]
fn test_indirect_store_has_no_bounds() {
    // p[idx[i]] = q[i]
    let mut b = FunctionBuilder::new("scatter");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let p = b.argument("p", MemType::I32);
    let q = b.argument("q", MemType::I32);
    let pq = b.strided(q, lp, 1, 0);
    let scatter = b.indirect(p);
    b.load(body, pq);
    b.store(body, scatter);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(error_of(info), Some(AccessError::UnboundedPointer { retry: false }));
        assert_eq!(info.report().unwrap().to_string(), "cannot identify array bounds");
    });
}

#[test]
fn test_symbolic_distance_retries_with_runtime_check() {
    // a[i + n] = a[i]
    let mut b = FunctionBuilder::new("shift");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let a = b.argument("a", MemType::I32);
    let n = b.integer("n");
    let src = b.strided(a, lp, 1, 0);
    let dst = b.element_ptr(a, MemType::I32, lp, Poly::var(n).scale(4), Poly::constant(4));
    b.load(body, src);
    b.store(body, dst);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithRuntimeChecks);
        assert!(info.report().is_none());

        let rt = info.runtime_pointer_check();
        assert_eq!(rt.len(), 2);
        assert_eq!(rt.check_pairs(), vec![(0, 1)]);

        let plan = info.runtime_check().unwrap();
        let far = |v: ValueId| Some(if v == n { 1000 } else { 0x10000 });
        let near = |v: ValueId| Some(if v == n { 1 } else { 0x10000 });
        assert_eq!(plan.any_conflict(&far), Some(false));
        assert_eq!(plan.any_conflict(&near), Some(true));
    });
}

#[test]
fn test_descending_runtime_check_detects_overlap() {
    // q[99 - i] = p[99 - i]
    let mut b = FunctionBuilder::new("reverse_copy");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let p = b.argument("p", MemType::I32);
    let q = b.argument("q", MemType::I32);
    let pp = b.strided(p, lp, -1, 99);
    let pq = b.strided(q, lp, -1, 99);
    b.load(body, pp);
    b.store(body, pq);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithRuntimeChecks);

        let rt = info.runtime_pointer_check();
        assert_eq!(rt.entries()[1].low, Poly::var(p));
        assert_eq!(rt.entries()[1].high, &Poly::var(p) + &Poly::constant(396));

        // p covers bytes 1000..=1396 and q covers 1200..=1596.
        let plan = info.runtime_check().unwrap();
        let overlapping = |v: ValueId| Some(if v == p { 1000 } else if v == q { 1200 } else { 0 });
        let apart = |v: ValueId| Some(if v == p { 1000 } else if v == q { 2000 } else { 0 });
        assert_eq!(plan.any_conflict(&overlapping), Some(true));
        assert_eq!(plan.any_conflict(&apart), Some(false));
    });
}

#[test]
fn test_retry_over_threshold_reports_too_many_checks() {
    // a[i + n] = a[i] with no comparisons allowed
    let mut b = FunctionBuilder::new("shift");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let a = b.argument("a", MemType::I32);
    let n = b.integer("n");
    let src = b.strided(a, lp, 1, 0);
    let dst = b.element_ptr(a, MemType::I32, lp, Poly::var(n).scale(4), Poly::constant(4));
    b.load(body, src);
    b.store(body, dst);
    let f = b.finish();

    let params = VectorizerParams::new().with_runtime_memory_check_threshold(0);
    with_info(&f, lp, &SymbolicStrides::default(), &params, |info| {
        assert_eq!(info.verdict(), Verdict::CannotVectorize);
        assert_eq!(
            error_of(info),
            Some(AccessError::TooManyRuntimeChecks {
                comparisons: 1,
                threshold: 0,
            })
        );
        assert!(info.runtime_check().is_none());
    });
}

#[test]
fn test_retry_requires_unit_stride() {
    // a[2i + n] = a[2i]
    let mut b = FunctionBuilder::new("shift");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let a = b.argument("a", MemType::I32);
    let n = b.integer("n");
    let src = b.strided(a, lp, 2, 0);
    let dst = b.element_ptr(a, MemType::I32, lp, Poly::var(n).scale(4), Poly::constant(8));
    b.set_no_wrap(src);
    b.set_no_wrap(dst);
    b.load(body, src);
    b.store(body, dst);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CannotVectorize);
        assert_eq!(error_of(info), Some(AccessError::UnboundedPointer { retry: true }));
        assert_eq!(
            info.report().unwrap().to_string(),
            "cannot check memory dependencies at runtime"
        );
        assert!(info.runtime_pointer_check().is_empty());
    });
}

#[test]
fn test_symbolic_stride_hypothesis() {
    // a[s * i] = a[i + 1], versioned on s == 1
    let mut b = FunctionBuilder::new("strided");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let a = b.noalias_array("a", MemType::F32);
    let s = b.integer("s");
    let s64 = b.int_cast(s);
    let src = b.strided(a, lp, 1, 1);
    let dst = b.symbolic_strided(a, lp, s64, 0);
    b.load(body, src);
    b.store(body, dst);
    let f = b.finish();
    let params = VectorizerParams::default();

    let mut strides = SymbolicStrides::default();
    strides.insert(dst, s64);
    with_info(&f, lp, &strides, &params, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
        assert_eq!(info.num_symbolic_strides(), 1);
    });

    default_info(&f, lp, |info| {
        assert_eq!(info.verdict(), Verdict::CannotVectorize);
        assert_eq!(error_of(info), Some(AccessError::UnsafeDependence));
    });
}

// =============================================================================
// Rejections
// =============================================================================

#[test]
fn test_unknown_trip_count() {
    let mut b = FunctionBuilder::new("f");
    let (lp, _) = b.simple_loop("while.body", None);
    let f = b.finish();

    default_info(&f, lp, |info| {
        assert_eq!(
            error_of(info),
            Some(AccessError::ShapeUnsupported(ShapeViolation::UnknownTripCount))
        );
        assert_eq!(info.report().unwrap().inst, None);
    });
}

#[test]
fn test_not_innermost() {
    let mut b = FunctionBuilder::new("f");
    let outer_hdr = b.block("outer");
    let inner_hdr = b.block("inner");
    let exit = b.block("exit");
    b.edge(outer_hdr, inner_hdr);
    b.edge(inner_hdr, inner_hdr);
    b.edge(inner_hdr, outer_hdr);
    b.edge(outer_hdr, exit);
    let outer = b.add_loop("outer", outer_hdr, &[outer_hdr, inner_hdr], Some(Poly::constant(9)));
    let inner = b.add_loop("inner", inner_hdr, &[inner_hdr], Some(Poly::constant(9)));
    b.nest(inner, outer);
    let f = b.finish();

    default_info(&f, outer, |info| {
        assert_eq!(
            error_of(info),
            Some(AccessError::ShapeUnsupported(ShapeViolation::NotInnermost))
        );
    });
    default_info(&f, inner, |info| {
        assert_eq!(info.verdict(), Verdict::CanVectorizeWithoutChecks);
    });
}

/// header -> body -> header, with the exit taken from `exits`.
fn two_block_loop(exits: &[usize], back_edges: &[usize]) -> (Function, LoopId) {
    let mut b = FunctionBuilder::new("f");
    let header = b.block("header");
    let body = b.block("body");
    let exit = b.block("exit");
    let blocks: [BlockId; 2] = [header, body];
    b.edge(header, body);
    for &i in back_edges {
        b.edge(blocks[i], header);
    }
    for &i in exits {
        b.edge(blocks[i], exit);
    }
    let lp = b.add_loop("loop", header, &blocks, Some(Poly::constant(9)));
    (b.finish(), lp)
}

#[test]
fn test_irregular_control_flow() {
    let cases = [
        (two_block_loop(&[1], &[0, 1]), ShapeViolation::NotSingleBackedge),
        (two_block_loop(&[0, 1], &[1]), ShapeViolation::NoSingleExit),
        (two_block_loop(&[0], &[1]), ShapeViolation::ExitNotLatch),
    ];
    for ((f, lp), violation) in cases {
        default_info(&f, lp, |info| {
            assert_eq!(error_of(info), Some(AccessError::ShapeUnsupported(violation)));
            assert_eq!(
                info.report().unwrap().to_string(),
                "loop control flow is not understood by analyzer"
            );
        });
    }

    let (f, lp) = two_block_loop(&[1], &[1]);
    default_info(&f, lp, |info| assert!(info.can_vectorize_memory()));
}

#[test]
fn test_volatile_store_reported_at_instruction() {
    let mut b = FunctionBuilder::new("f");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let a = b.noalias_array("a", MemType::I32);
    let p = b.strided(a, lp, 1, 0);
    b.load(body, p);
    let st = b.store_with(body, p, AccessFlags::VOLATILE, None);
    let f = b.finish();

    default_info(&f, lp, |info| {
        let report = info.report().unwrap();
        assert_eq!(
            report.error,
            AccessError::UnsupportedMemoryOp(MemoryOpViolation::NonSimpleStore)
        );
        assert_eq!(report.inst, Some(st));
        assert_eq!(report.to_string(), "write with atomic ordering or volatile write");
    });
}

#[test]
fn test_uniform_store_rejected() {
    // sum[0] += a[i]
    let mut b = FunctionBuilder::new("reduce");
    let (lp, body) = b.simple_loop("for.body", Some(Poly::constant(99)));
    let a = b.noalias_array("a", MemType::I32);
    let sum = b.noalias_array("sum", MemType::I32);
    let pa = b.strided(a, lp, 1, 0);
    let acc = b.invariant(sum, 0);
    b.load(body, pa);
    b.load(body, acc);
    let st = b.store(body, acc);
    let f = b.finish();

    default_info(&f, lp, |info| {
        let report = info.report().unwrap();
        assert_eq!(report.error, AccessError::UniformWriteRejected);
        assert_eq!(report.inst, Some(st));
        assert!(info.is_uniform(acc));
        assert!(!info.is_uniform(pa));
    });
}

// =============================================================================
// Whole-Function Analysis
// =============================================================================

#[test]
fn test_analysis_is_deterministic() {
    let (f, lp) = many_arguments(2, 2);
    let params = VectorizerParams::default();
    let none = SymbolicStrides::default();

    let first = with_info(&f, lp, &none, &params, |info| {
        (info.verdict(), info.max_safe_dep_dist_bytes(), info.runtime_pointer_check().clone())
    });
    let second = with_info(&f, lp, &none, &params, |info| {
        (info.verdict(), info.max_safe_dep_dist_bytes(), info.runtime_pointer_check().clone())
    });
    assert_eq!(first, second);
    assert_eq!(first.0, Verdict::CanVectorizeWithRuntimeChecks);
    assert_eq!(analyze_with(&f, lp, &none, &params), analyze_with(&f, lp, &none, &params));
}

#[test]
fn test_function_printout() {
    let (f, lp, _, _, pp, pq) = may_alias_copy();
    let aa = BasicAliasAnalysis::new(&f);
    let cx = AnalysisContext::new(&f, &aa);
    let mut laa = LoopAccessAnalysis::new(cx, &VectorizerParams::default());

    let mut out = String::new();
    laa.print(&mut out).unwrap();
    let expect = format!(
        "  for.body:\n    Memory dependences are safe with run-time checks\n    Run-time memory checks:\n    0:\n      {}\n      {}\n\n",
        f.value_name(pq),
        f.value_name(pp)
    );
    assert_eq!(out, expect);
    assert_eq!(
        laa.get_info(lp, &SymbolicStrides::default()).verdict(),
        Verdict::CanVectorizeWithRuntimeChecks
    );
}
