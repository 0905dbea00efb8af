//! # Demonstration Grammar
//!
//! A small settlement: a plaza on flat-enough terrain, streets growing out of
//! it, houses along the streets, trees at the plaza corners. Used by the
//! `structgen` driver, the integration tests and the benches.
//!
//! ```text
//!   settlement ─> plaza ─┬─> street ─> road ──> street ...
//!                        │               └──> alley ─> house
//!                        └─> grove ─> tree
//! ```
//!
//! Street recursion is bounded by a `depth` parameter that every road
//! increments.

use structura_core::grammar::pragma;
use structura_core::{
    Axis, BinaryOp, BlockId, BlockOrientation, BlockPos, CompareOp, Dimensionality,
    ExternalId, Facing, FieldId, Grammar, GrammarBuilder, GrammarResult, OverlapPolicy,
    PragmaValue, Sample, SymbolRef, ValueType,
};

use crate::eval::FieldProvider;

/// Name of the entry rule.
pub const SETTLEMENT_RULE: &str = "settlement";

/// External field: terrain surface height.
pub const TERRAIN_HEIGHT: ExternalId = ExternalId(0);

/// Streets stop growing at this depth.
pub const MAX_STREET_DEPTH: f32 = 4.0;

/// Block IDs used by the demo.
pub mod blocks {
    use structura_core::BlockId;

    /// Stone.
    pub const STONE: BlockId = BlockId(2);
    /// Planks.
    pub const PLANKS: BlockId = BlockId(3);
    /// Cobblestone.
    pub const COBBLE: BlockId = BlockId(4);
    /// Glass.
    pub const GLASS: BlockId = BlockId(5);
    /// Log.
    pub const LOG: BlockId = BlockId(6);
    /// Leaves.
    pub const LEAVES: BlockId = BlockId(7);
}

/// Rolling terrain from a couple of sine waves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DemoTerrain {
    /// Mean surface height.
    pub base_height: f32,
}

impl Default for DemoTerrain {
    fn default() -> Self {
        Self { base_height: 64.0 }
    }
}

impl DemoTerrain {
    /// Surface height of a column.
    #[must_use]
    pub fn height_at(&self, x: i32, z: i32) -> f32 {
        self.base_height + 6.0 * (x as f32 / 23.0).sin() + 4.0 * (z as f32 / 17.0).cos()
    }
}

impl FieldProvider for DemoTerrain {
    fn dimensionality(&self, field: ExternalId) -> Dimensionality {
        if field == TERRAIN_HEIGHT {
            Dimensionality::Varying
        } else {
            Dimensionality::Constant
        }
    }

    fn sample(&self, field: ExternalId, pos: BlockPos) -> Sample {
        if field == TERRAIN_HEIGHT {
            Sample::Float(self.height_at(pos.x, pos.z))
        } else {
            Sample::Float(0.0)
        }
    }
}

fn facing(forward: Facing) -> BlockOrientation {
    BlockOrientation::new(forward, Facing::PosY)
}

fn boxed(b: &mut GrammarBuilder, start: [i32; 3], end: [i32; 3]) -> (FieldId, FieldId) {
    (
        b.position(BlockPos::from_array(start)),
        b.position(BlockPos::from_array(end)),
    )
}

/// Builds the settlement grammar.
///
/// # Errors
///
/// Only on a construction bug; the grammar is fixed.
pub fn settlement_grammar() -> GrammarResult<Grammar> {
    let mut b = GrammarBuilder::new();

    let settlement = b.rule(SETTLEMENT_RULE);
    let street = b.rule("street");
    let alley = b.rule("alley");
    let grove = b.rule("grove");

    let plaza = b.component("plaza");
    let road = b.component("road");
    let house = b.component("house");
    let tree = b.component("tree");

    let origin = b.position(BlockPos::ZERO);
    let no_rotation = PragmaValue::Bool(false);

    // -------------------------------------------------------------------------
    // Plaza: only where the terrain is within 4 blocks of the origin
    // -------------------------------------------------------------------------
    let world = b.world_position();
    let world_y = b.axis(world, Axis::Y);
    let height = b.external(TERRAIN_HEIGHT, ValueType::Float);
    let tolerance = b.float(4.0);
    let low = b.binary(BinaryOp::Sub, height, tolerance);
    let high = b.binary(BinaryOp::Add, height, tolerance);
    let above_low = b.compare(CompareOp::Ge, world_y, low);
    let below_high = b.compare(CompareOp::Le, world_y, high);
    let on_surface = b.and(above_low, below_high);
    b.add_condition(SymbolRef::Component(plaza), on_surface);

    b.node(plaza, "center", origin, BlockOrientation::Unspecified, None);
    for (pos, forward) in [
        ([4, 0, 0], Facing::PosX),
        ([-4, 0, 0], Facing::NegX),
        ([0, 0, 4], Facing::PosZ),
        ([0, 0, -4], Facing::NegZ),
    ] {
        let p = b.position(BlockPos::from_array(pos));
        b.node(plaza, "exit", p, facing(forward), Some(street));
    }
    for pos in [[6, 0, 6], [-6, 0, 6], [6, 0, -6], [-6, 0, -6]] {
        let p = b.position(BlockPos::from_array(pos));
        b.node(plaza, "corner", p, BlockOrientation::Unspecified, Some(grove));
    }

    let cobble = b.block(blocks::COBBLE);
    let stone = b.block(blocks::STONE);
    let (floor_start, floor_end) = boxed(&mut b, [-3, -1, -3], [3, -1, 3]);
    b.fill_box(plaza, cobble, floor_start, Some(floor_end));
    b.fill_positions(
        plaza,
        stone,
        vec![
            BlockPos::new(-1, 0, -1),
            BlockPos::new(0, 0, -1),
            BlockPos::new(1, 0, -1),
            BlockPos::new(-1, 0, 0),
            BlockPos::new(1, 0, 0),
            BlockPos::new(-1, 0, 1),
            BlockPos::new(0, 0, 1),
            BlockPos::new(1, 0, 1),
        ],
        None,
    );
    let (lot_start, lot_end) = boxed(&mut b, [-3, -1, -3], [3, 3, 3]);
    b.area(plaza, "lot", lot_start, lot_end, OverlapPolicy::MustNotOverlap, false);

    b.expand_to_component(settlement, plaza, Some("center"), false);

    // -------------------------------------------------------------------------
    // Streets: a road segment, a house, or nothing
    // -------------------------------------------------------------------------
    let zero = b.float(0.0);
    let street_depth = b.param(SymbolRef::Rule(street), "depth", ValueType::Float, Some(zero));
    let max_depth = b.float(MAX_STREET_DEPTH);
    let shallow = b.compare(CompareOp::Lt, street_depth, max_depth);
    b.add_condition(SymbolRef::Rule(street), shallow);
    b.set_pragma(
        SymbolRef::Rule(street),
        pragma::DEPTH_FIRST_PROBABILITY,
        PragmaValue::Number(0.25),
    );

    let to_road = b.expand_to_component(street, road, Some("start"), false);
    b.set_pragma(SymbolRef::Expansion(to_road), pragma::PROBABILITY_RATIO, PragmaValue::Number(300.0));
    b.expand_to_component(street, house, Some("door"), false);
    b.expand_to_void(street);

    // -------------------------------------------------------------------------
    // Road: 7 blocks long, side alleys, continues as another street
    // -------------------------------------------------------------------------
    let road_depth = b.param(SymbolRef::Component(road), "depth", ValueType::Float, Some(zero));
    let one = b.float(1.0);
    let deeper = b.binary(BinaryOp::Add, road_depth, one);
    b.set_param(SymbolRef::Component(road), "depth", deeper);

    let start = b.node(road, "start", origin, facing(Facing::NegZ), None);
    b.set_node_pragma(road, start, pragma::ALLOW_ROTATION, no_rotation);
    let end = b.position(BlockPos::new(0, 0, 6));
    b.node(road, "end", end, facing(Facing::PosZ), Some(street));
    let left = b.position(BlockPos::new(2, 0, 3));
    b.node(road, "side", left, facing(Facing::PosX), Some(alley));
    let right = b.position(BlockPos::new(-2, 0, 3));
    b.node(road, "side", right, facing(Facing::NegX), Some(alley));

    let (road_start, road_end) = boxed(&mut b, [-1, -1, 0], [1, -1, 5]);
    b.fill_box(road, stone, road_start, Some(road_end));
    let (road_lot_start, road_lot_end) = boxed(&mut b, [-1, -1, 0], [1, 2, 5]);
    b.area(road, "lot", road_lot_start, road_lot_end, OverlapPolicy::MustNotOverlap, false);

    b.expand_to_component(alley, house, Some("door"), false);
    let mirrored = b.expand_to_component(alley, house, Some("door"), true);
    b.set_pragma(SymbolRef::Expansion(mirrored), pragma::PROBABILITY_RATIO, PragmaValue::Number(50.0));
    b.expand_to_void(alley);

    // -------------------------------------------------------------------------
    // House: 5x5 footprint behind its door, some lots stay empty
    // -------------------------------------------------------------------------
    let chance = b.context_random(77);
    let threshold = b.float(0.85);
    let built = b.compare(CompareOp::Lt, chance, threshold);
    b.add_condition(SymbolRef::Component(house), built);

    let door = b.node(house, "door", origin, facing(Facing::NegZ), None);
    b.set_node_pragma(house, door, pragma::ALLOW_ROTATION, no_rotation);

    let grain = b.block_random(3);
    let mossy = b.float(0.2);
    let is_mossy = b.compare(CompareOp::Lt, grain, mossy);
    let planks = b.block(blocks::PLANKS);
    let wall = b.select(is_mossy, cobble, planks);
    let (walls_start, walls_end) = boxed(&mut b, [-2, 0, 1], [2, 3, 5]);
    b.fill_box(house, wall, walls_start, Some(walls_end));

    let air = b.block(BlockId::AIR);
    let (inside_start, inside_end) = boxed(&mut b, [-1, 0, 2], [1, 2, 4]);
    b.fill_box(house, air, inside_start, Some(inside_end));

    let glass = b.block(blocks::GLASS);
    b.fill_positions(
        house,
        glass,
        vec![BlockPos::new(-2, 1, 3), BlockPos::new(2, 1, 3)],
        None,
    );
    let doorway = b.position(BlockPos::new(0, 0, 1));
    b.fill_positions(
        house,
        air,
        vec![BlockPos::ZERO, BlockPos::new(0, 1, 0)],
        Some(doorway),
    );

    let log = b.block(blocks::LOG);
    let (roof_start, roof_end) = boxed(&mut b, [-2, 4, 1], [2, 4, 5]);
    b.fill_box(house, log, roof_start, Some(roof_end));
    let (house_lot_start, house_lot_end) = boxed(&mut b, [-2, 0, 1], [2, 4, 5]);
    b.area(house, "lot", house_lot_start, house_lot_end, OverlapPolicy::MustNotOverlap, false);

    // -------------------------------------------------------------------------
    // Trees: sparse leaves, never on a lot
    // -------------------------------------------------------------------------
    b.expand_to_component(grove, tree, None, false);
    b.expand_to_void(grove);

    b.node(tree, "root", origin, BlockOrientation::Unspecified, None);
    let rustle = b.block_random(11);
    let dense = b.float(0.7);
    let has_leaf = b.compare(CompareOp::Lt, rustle, dense);
    let leaves = b.block(blocks::LEAVES);
    let nothing = b.block(BlockId::UNDEFINED);
    let foliage = b.select(has_leaf, leaves, nothing);
    let (crown_start, crown_end) = boxed(&mut b, [-2, 3, -2], [2, 5, 2]);
    b.fill_box(tree, foliage, crown_start, Some(crown_end));
    let (trunk_start, trunk_end) = boxed(&mut b, [0, 0, 0], [0, 4, 0]);
    b.fill_box(tree, log, trunk_start, Some(trunk_end));
    let (tree_lot_start, tree_lot_end) = boxed(&mut b, [-2, 0, -2], [2, 5, 2]);
    b.area(tree, "lot", tree_lot_start, tree_lot_end, OverlapPolicy::MustNotOverlap, false);

    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::GeneratorConfig;
    use crate::generator::StructureGenerator;

    #[test]
    fn test_grammar_builds() {
        let grammar = settlement_grammar().expect("demo grammar");
        assert!(grammar.find_rule(SETTLEMENT_RULE).is_some());
        assert_eq!(grammar.component_count(), 4);
    }

    #[test]
    fn test_settlement_on_surface() {
        let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
        let terrain = DemoTerrain::default();
        let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
        let mut gen = StructureGenerator::new(grammar, Arc::new(terrain), GeneratorConfig::default());

        let y = terrain.height_at(0, 0).round() as i32;
        let output = gen.generate(rule, BlockPos::new(0, y, 0), 11).expect("settlement");

        assert!(!gen.components().is_empty());
        assert_eq!(output.block_at(BlockPos::new(0, y - 1, 0)), blocks::COBBLE);
        assert_eq!(output.block_at(BlockPos::new(1, y, 1)), blocks::STONE);
        assert!(gen.areas().iter().all(|a| a.name_id == 0));
    }

    #[test]
    fn test_no_settlement_in_the_sky() {
        let grammar = Arc::new(settlement_grammar().expect("demo grammar"));
        let rule = grammar.find_rule(SETTLEMENT_RULE).expect("entry rule");
        let mut gen = StructureGenerator::new(grammar, Arc::new(DemoTerrain::default()), GeneratorConfig::default());

        gen.setup(rule, BlockPos::new(0, 200, 0), 11);
        assert!(gen.process().is_err());
        assert!(gen.components().is_empty());
    }
}
