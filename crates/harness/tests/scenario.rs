use fieldline_core::HistoryEntry;
use fieldline_harness::*;
use proptest::prelude::*;
use time::Duration;
use time::macros::datetime;

#[test]
fn edit_schedule_replace_and_promote() -> Result<(), Box<dyn std::error::Error>> {
    let bench = TestBench::new()?;
    let far_future = datetime!(2099-01-01 0:00 UTC);

    let record = bench.create(&[(PERSONAL, FIRST_NAME, "A")])?;
    let first = record.field(PERSONAL, FIRST_NAME).unwrap();
    assert_eq!(first.current_value, "A");
    assert!(first.history.is_empty());

    bench.advance_days(1);
    bench.set(record.id, PERSONAL, FIRST_NAME, "B")?;
    let first = bench.field(record.id, PERSONAL, FIRST_NAME)?.unwrap();
    assert_eq!(first.current_value, "B");
    assert_eq!(first.history.len(), 1);
    assert_eq!(first.history[0].value, "A");

    bench.schedule(record.id, PERSONAL, FIRST_NAME, "C", far_future)?;
    let first = bench.field(record.id, PERSONAL, FIRST_NAME)?.unwrap();
    assert_eq!(first.current_value, "B");
    assert_eq!(first.future_changes.len(), 1);
    assert_eq!(first.future_changes[0].value, "C");

    bench.schedule(record.id, PERSONAL, FIRST_NAME, "D", far_future)?;
    let first = bench.field(record.id, PERSONAL, FIRST_NAME)?.unwrap();
    assert_eq!(first.current_value, "B");
    assert_eq!(first.future_changes.len(), 1);
    assert_eq!(first.future_changes[0].value, "D");

    // Nothing happens before the date.
    bench.engine.reconcile_once()?;
    assert_eq!(bench.field(record.id, PERSONAL, FIRST_NAME)?.unwrap().current_value, "B");

    bench.advance_to(far_future + Duration::minutes(5));
    bench.engine.reconcile_once()?;
    let first = bench.field(record.id, PERSONAL, FIRST_NAME)?.unwrap();
    assert_eq!(first.current_value, "D");
    let archived: Vec<_> = first.history.iter().map(|h| h.value.as_str()).collect();
    assert_eq!(archived, vec!["A", "B"]);
    assert!(first.future_changes.is_empty());
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Set(String),
    Schedule(String, i64),
    Advance(i64),
    Reconcile,
}

fn op() -> impl Strategy<Value = Op> {
    let value = prop::sample::select(vec!["v1", "v2", "v3", "v4"]).prop_map(str::to_string);
    prop_oneof![
        value.clone().prop_map(Op::Set),
        (value, 0i64..20).prop_map(|(v, days)| Op::Schedule(v, days)),
        (0i64..10).prop_map(Op::Advance),
        Just(Op::Reconcile),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn field_history_is_append_only_through_the_engine(
        ops in proptest::collection::vec(op(), 1..40)
    ) {
        let bench = TestBench::new().unwrap();
        let record = bench.create(&[(CONTRACT, SALARY, "v0")]).unwrap();
        let mut seen: Vec<HistoryEntry> = Vec::new();

        for op in ops {
            match op {
                Op::Set(value) => {
                    bench.set(record.id, CONTRACT, SALARY, &value).unwrap();
                }
                Op::Schedule(value, days) => {
                    let date = bench.engine.now() + Duration::days(days);
                    bench.schedule(record.id, CONTRACT, SALARY, &value, date).unwrap();
                }
                Op::Advance(days) => bench.advance_days(days),
                Op::Reconcile => {
                    bench.engine.reconcile_once().unwrap();
                    let state = bench.field(record.id, CONTRACT, SALARY).unwrap().unwrap();
                    prop_assert!(!state.has_due(bench.engine.now()));
                }
            }

            let state = bench.field(record.id, CONTRACT, SALARY).unwrap().unwrap();
            prop_assert!(state.history.starts_with(&seen));
            prop_assert!(state.is_well_ordered());
            seen = state.history;
        }
    }
}
