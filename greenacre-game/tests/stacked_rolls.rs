use greenacre_game::catalog::standard;
use greenacre_game::rng::scripted::{FixedSource, SequenceSource};
use greenacre_game::{
    EngineConfig, FarmEngine, RollContext, SellFilter, VariantCombo, calculate_value,
    roll_stacked, roll_variant,
};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ripe_wheat(engine: &mut FarmEngine, field: usize) {
    let def = standard().plant("wheat").unwrap().clone();
    engine.with_state_mut(|state| {
        state.fields[field].sow(&def, 0);
        state.fields[field].advance(u64::MAX);
    });
}

#[test]
fn follow_up_rolls_skip_held_variants() {
    init_logs();
    let catalog = standard();
    // cosmic, rainbow, diamond and ruby miss, gold hits; the second roll
    // skips gold and lands shiny; the third misses everything left.
    let mut source = SequenceSource::new(
        [0.9, 0.9, 0.9, 0.9, 0.03, 0.9, 0.9, 0.9, 0.9, 0.01],
        0.9,
    );
    let combo = roll_stacked(catalog, &RollContext::neutral(), &mut source);
    assert_eq!(combo.key(), "gold+shiny");
    assert_eq!(source.consumed(), 14);
}

#[test]
fn a_miss_on_every_variant_is_normal() {
    let catalog = standard();
    let mut source = SequenceSource::new([], 0.99);
    let single = roll_variant(catalog, &RollContext::neutral(), &mut source);
    assert_eq!(single, "normal");
    assert_eq!(source.consumed(), 6);

    let combo = roll_stacked(catalog, &RollContext::neutral(), &mut FixedSource::always_fail());
    assert!(combo.is_normal());
}

#[test]
fn stacks_never_exceed_three_variants() {
    let catalog = standard();
    let combo = roll_stacked(
        catalog,
        &RollContext::neutral(),
        &mut FixedSource::always_succeed(),
    );
    assert_eq!(combo.len(), 3);
    assert_eq!(combo.best_rank(catalog).unwrap(), 6);
    assert!(!combo.contains("normal"));
}

#[test]
fn event_focus_shortens_odds() {
    let ctx = RollContext {
        event_focus: Some("gold"),
        ..RollContext::neutral()
    };
    assert!((ctx.effective_rarity(25.0, "gold") - 6.25).abs() < f64::EPSILON);
    assert!((ctx.effective_rarity(10.0, "shiny") - 5.0).abs() < f64::EPSILON);
    assert!((RollContext::neutral().effective_rarity(10.0, "shiny") - 10.0).abs() < f64::EPSILON);
}

#[test]
fn stacked_value_sums_multipliers() {
    let catalog = standard();
    let combo = VariantCombo::parse("gold+shiny").unwrap();
    assert_eq!(calculate_value(catalog, 15, &combo, 0, 1.0).unwrap(), 60);
    assert_eq!(calculate_value(catalog, 15, &combo, 10, 1.0).unwrap(), 120);
    assert_eq!(
        calculate_value(catalog, 15, &VariantCombo::normal(), 0, 1.0).unwrap(),
        15
    );
    let unknown = VariantCombo::parse("gold+opal").unwrap();
    assert!(calculate_value(catalog, 15, &unknown, 0, 1.0).is_err());
}

#[test]
fn discoveries_survive_sales_and_rebirth() {
    init_logs();
    let mut engine = FarmEngine::new(EngineConfig { seed: 5 }, 0)
        .with_random_source(Box::new(FixedSource::always_succeed()));
    ripe_wheat(&mut engine, 0);
    let outcome = engine.harvest(0).unwrap();
    assert_eq!(outcome.new_discoveries.len(), 3);
    assert_eq!(engine.state().discovered_pairs(), 3);

    engine.sell_all(SellFilter::All).unwrap();
    assert!(engine.state().harvested.is_empty());
    assert_eq!(engine.state().discovered_pairs(), 3);

    engine.with_state_mut(|state| state.currency = 50_000);
    engine.do_prestige(1).unwrap();
    assert_eq!(engine.state().discovered_pairs(), 3);
    assert!((engine.discovered_fraction() - 3.0 / 91.0).abs() < 1e-12);

    ripe_wheat(&mut engine, 0);
    let again = engine.harvest(0).unwrap();
    assert!(again.new_discoveries.is_empty());
    assert_eq!(engine.state().discovered_pairs(), 3);
}
