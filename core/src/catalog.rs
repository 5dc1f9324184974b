use std::collections::BTreeMap;

use ndarray::Array2;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::*;

/// Symbol every memory grid target is drawn with.
pub const TARGET_SYMBOL: &str = "🍍";

/// Size of the memory grid puzzles.
pub const GRID_SIZE: Coord2 = (5, 5);

const FRUITS: &[&str] = &["🍎", "🍌", "🍇", "🍓", "🍊"];

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// Targets sit at fixed coordinates, every other cell is padded with filler symbols.
    Grid { size: Coord2 },
    /// The filler symbols are letters, shuffled into a single row. Targets are words.
    Letters,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Targets {
    Cells(Vec<Coord2>),
    Words(Vec<String>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Self::Cells(cells) => cells.len(),
            Self::Words(words) => words.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalized form used to compare word guesses against word targets.
pub fn normalize_word(word: &str) -> String {
    word.trim().to_uppercase()
}

fn owned(symbols: &[&str]) -> Vec<String> {
    symbols.iter().map(|symbol| symbol.to_string()).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PuzzleDefinition {
    id: String,
    layout: Layout,
    targets: Targets,
    filler_symbols: Vec<String>,
    difficulty: u8,
    target_count: usize,
}

impl PuzzleDefinition {
    pub(crate) fn new_unchecked(
        id: &str,
        layout: Layout,
        targets: Targets,
        filler_symbols: Vec<String>,
        difficulty: u8,
        target_count: usize,
    ) -> Self {
        Self {
            id: id.to_string(),
            layout,
            targets,
            filler_symbols,
            difficulty,
            target_count,
        }
    }

    pub fn grid(
        id: &str,
        size: Coord2,
        targets: &[Coord2],
        filler_symbols: &[&str],
        difficulty: u8,
        target_count: usize,
    ) -> Result<Self> {
        let definition = Self::new_unchecked(
            id,
            Layout::Grid { size },
            Targets::Cells(targets.to_vec()),
            owned(filler_symbols),
            difficulty,
            target_count,
        );
        definition.validate()?;
        Ok(definition)
    }

    pub fn letters(
        id: &str,
        letters: &[&str],
        words: &[&str],
        difficulty: u8,
        target_count: usize,
    ) -> Result<Self> {
        let definition = Self::new_unchecked(
            id,
            Layout::Letters,
            Targets::Words(words.iter().map(|word| normalize_word(word)).collect()),
            owned(letters),
            difficulty,
            target_count,
        );
        definition.validate()?;
        Ok(definition)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_count != self.targets.len() {
            return Err(GameError::TargetCountMismatch {
                id: self.id.clone(),
                declared: self.target_count,
                actual: self.targets.len(),
            });
        }

        if self.filler_symbols.is_empty() {
            return Err(GameError::MissingFiller(self.id.clone()));
        }

        match (&self.layout, &self.targets) {
            (Layout::Grid { size }, Targets::Cells(cells)) => {
                if cells.iter().any(|&coords| !contains(*size, coords)) {
                    return Err(GameError::InvalidCoords);
                }
                let mut seen = cells.clone();
                seen.sort_unstable();
                seen.dedup();
                if seen.len() != cells.len() {
                    return Err(GameError::DuplicateTarget(self.id.clone()));
                }
            }
            (Layout::Letters, Targets::Words(words)) => {
                if self.filler_symbols.len() > usize::from(Coord::MAX) {
                    return Err(GameError::InvalidBoardShape);
                }
                let mut seen = words.clone();
                seen.sort_unstable();
                seen.dedup();
                if seen.len() != words.len() {
                    return Err(GameError::DuplicateTarget(self.id.clone()));
                }
            }
            _ => return Err(GameError::InvalidBoardShape),
        }

        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn filler_symbols(&self) -> &[String] {
        &self.filler_symbols
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// Builds the board a session plays on.
    ///
    /// Grid puzzles are deterministic: targets go to their coordinates and the remaining cells
    /// are filled row-major by cycling through the filler symbols. Letter puzzles get a uniform
    /// Fisher–Yates permutation of their letters.
    pub fn materialize(&self, rng: &mut SmallRng) -> Result<PuzzleInstance> {
        let symbols = match (&self.layout, &self.targets) {
            (Layout::Grid { size }, Targets::Cells(cells)) => {
                let mut symbols: Array2<Option<String>> = Array2::default(size.to_nd_index());
                for &coords in cells {
                    if !contains(*size, coords) {
                        return Err(GameError::InvalidCoords);
                    }
                    symbols[coords.to_nd_index()] = Some(TARGET_SYMBOL.to_string());
                }

                let mut filler = self.filler_symbols.iter().cycle();
                symbols.map(|symbol| match symbol {
                    Some(symbol) => symbol.clone(),
                    None => filler.next().cloned().unwrap_or_default(),
                })
            }
            (Layout::Letters, Targets::Words(_)) => {
                let mut letters = self.filler_symbols.clone();
                for i in (1..letters.len()).rev() {
                    let j = rng.random_range(0..=i);
                    letters.swap(i, j);
                }
                let len = letters.len();
                Array2::from_shape_vec((1, len), letters)
                    .map_err(|_| GameError::InvalidBoardShape)?
            }
            _ => return Err(GameError::InvalidBoardShape),
        };

        Ok(PuzzleInstance {
            id: self.id.clone(),
            layout: self.layout,
            difficulty: self.difficulty,
            targets: self.targets.clone(),
            symbols,
        })
    }
}

/// A definition laid out for one session. Owned by the session and dropped on reset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PuzzleInstance {
    id: String,
    layout: Layout,
    difficulty: u8,
    targets: Targets,
    symbols: Array2<String>,
}

impl PuzzleInstance {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn size(&self) -> Coord2 {
        let (rows, cols) = self.symbols.dim();
        (
            rows.try_into().unwrap_or(Coord::MAX),
            cols.try_into().unwrap_or(Coord::MAX),
        )
    }

    pub fn validate_coords(&self, coords: Coord2) -> Result<Coord2> {
        if contains(self.size(), coords) {
            Ok(coords)
        } else {
            Err(GameError::InvalidCoords)
        }
    }

    pub fn symbol_at(&self, coords: Coord2) -> &str {
        &self.symbols[coords.to_nd_index()]
    }

    pub fn is_target_cell(&self, coords: Coord2) -> bool {
        match &self.targets {
            Targets::Cells(cells) => cells.contains(&coords),
            Targets::Words(_) => false,
        }
    }

    /// Returns the normalized word when it is one of the targets.
    pub fn target_word(&self, word: &str) -> Option<String> {
        let Targets::Words(words) = &self.targets else {
            return None;
        };
        let word = normalize_word(word);
        words.contains(&word).then_some(word)
    }

    /// `(position, symbol)` pairs in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (Coord2, &str)> {
        iter_coords(self.size()).map(|coords| (coords, self.symbol_at(coords)))
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogKind {
    #[default]
    MemoryGrid,
    WordSearch,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Catalog {
    kind: CatalogKind,
    puzzles: BTreeMap<Variant, Vec<PuzzleDefinition>>,
}

impl Catalog {
    pub fn empty(kind: CatalogKind) -> Self {
        Self {
            kind,
            puzzles: BTreeMap::new(),
        }
    }

    pub fn builtin(kind: CatalogKind) -> Self {
        match kind {
            CatalogKind::MemoryGrid => Self::memory_grid(),
            CatalogKind::WordSearch => Self::word_search(),
        }
    }

    /// 5×5 fruit grids. Variant A hides 4 pineapples (difficulty 3), variant B hides 5
    /// (difficulty 5).
    pub fn memory_grid() -> Self {
        const A: &[(&str, [Coord2; 4])] = &[
            ("A1", [(0, 1), (2, 3), (4, 0), (1, 4)]),
            ("A2", [(1, 1), (3, 2), (0, 4), (4, 3)]),
            ("A3", [(2, 2), (0, 0), (4, 4), (1, 3)]),
            ("A4", [(3, 1), (1, 0), (2, 4), (0, 2)]),
            ("A5", [(4, 1), (2, 0), (0, 3), (3, 4)]),
        ];
        const B: &[(&str, [Coord2; 5])] = &[
            ("B1", [(0, 1), (2, 3), (4, 0), (1, 4), (3, 2)]),
            ("B2", [(1, 1), (3, 2), (0, 4), (4, 3), (2, 0)]),
            ("B3", [(2, 2), (0, 0), (4, 4), (1, 3), (3, 1)]),
            ("B4", [(3, 1), (1, 0), (2, 4), (0, 2), (4, 2)]),
            ("B5", [(4, 1), (2, 0), (0, 3), (3, 4), (1, 2)]),
        ];

        let grid = |id: &str, cells: &[Coord2], difficulty: u8| {
            PuzzleDefinition::new_unchecked(
                id,
                Layout::Grid { size: GRID_SIZE },
                Targets::Cells(cells.to_vec()),
                owned(FRUITS),
                difficulty,
                cells.len(),
            )
        };

        let mut catalog = Self::empty(CatalogKind::MemoryGrid);
        for (id, cells) in A {
            catalog.register(Variant::A, grid(id, cells, 3));
        }
        for (id, cells) in B {
            catalog.register(Variant::B, grid(id, cells, 5));
        }
        catalog
    }

    /// Letter puzzles. Variant A asks for 3 words (difficulty 3), variant B for 4 (difficulty 5).
    pub fn word_search() -> Self {
        const A: &[(&str, &str, [&str; 3])] = &[
            ("A1", "CODERUNSTART", ["CODE", "RUNS", "STAR"]),
            ("A2", "TESTDATABUGS", ["TEST", "DATA", "BUGS"]),
            ("A3", "LOOPFILESAVE", ["LOOP", "FILE", "SAVE"]),
            ("A4", "BASETYPECALL", ["BASE", "TYPE", "CALL"]),
            ("A5", "LINKPATHMODE", ["LINK", "PATH", "MODE"]),
        ];
        const B: &[(&str, &str, [&str; 4])] = &[
            ("B1", "COMPUTERSCIENCEDATA", ["COMP", "PURE", "ENCE", "DATA"]),
            ("B2", "BUILDTOOLSHIPMERGE", ["BUILD", "TOOLS", "SHIP", "MERGE"]),
            ("B3", "DEBUGTRACELOGSFIXE", ["DEBUG", "TRACE", "LOGS", "FIXE"]),
            ("B4", "PARSEQUERYJOINKEYS", ["PARSE", "QUERY", "JOIN", "KEYS"]),
            ("B5", "STACKHEAPQUEUEPUSH", ["STACK", "HEAP", "QUEUE", "PUSH"]),
        ];

        let letters = |id: &str, letters: &str, words: &[&str], difficulty: u8| {
            PuzzleDefinition::new_unchecked(
                id,
                Layout::Letters,
                Targets::Words(owned(words)),
                letters.chars().map(String::from).collect(),
                difficulty,
                words.len(),
            )
        };

        let mut catalog = Self::empty(CatalogKind::WordSearch);
        for (id, sequence, words) in A {
            catalog.register(Variant::A, letters(id, sequence, words, 3));
        }
        for (id, sequence, words) in B {
            catalog.register(Variant::B, letters(id, sequence, words, 5));
        }
        catalog
    }

    pub fn kind(&self) -> CatalogKind {
        self.kind
    }

    pub fn register(&mut self, variant: Variant, definition: PuzzleDefinition) {
        self.puzzles.entry(variant).or_default().push(definition);
    }

    pub fn puzzles(&self, variant: Variant) -> &[PuzzleDefinition] {
        self.puzzles.get(&variant).map_or(&[], Vec::as_slice)
    }

    /// Uniformly picks one of the definitions registered for `variant`.
    pub fn select_puzzle(&self, variant: Variant, rng: &mut SmallRng) -> Result<&PuzzleDefinition> {
        let puzzles = self.puzzles(variant);
        if puzzles.is_empty() {
            log::error!("Catalog {:?} has no puzzles for variant {}", self.kind, variant);
            return Err(GameError::NoPuzzlesForVariant(variant));
        }
        let index = rng.random_range(0..puzzles.len());
        Ok(&puzzles[index])
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin(CatalogKind::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    #[test]
    fn builtin_catalogs_are_valid_for_every_variant() {
        for kind in [CatalogKind::MemoryGrid, CatalogKind::WordSearch] {
            let catalog = Catalog::builtin(kind);
            assert_eq!(catalog.kind(), kind);
            for variant in Variant::ALL {
                assert_eq!(catalog.puzzles(variant).len(), 5);
                for definition in catalog.puzzles(variant) {
                    definition.validate().unwrap();
                    assert_eq!(definition.target_count(), definition.targets().len());
                }
            }
        }
    }

    #[test]
    fn select_puzzle_always_respects_target_count() {
        let catalog = Catalog::memory_grid();
        let mut rng = rng();
        for _ in 0..100 {
            for variant in Variant::ALL {
                let definition = catalog.select_puzzle(variant, &mut rng).unwrap();
                assert_eq!(definition.targets().len(), definition.target_count());
            }
        }
    }

    #[test]
    fn select_puzzle_eventually_visits_every_definition() {
        let catalog = Catalog::memory_grid();
        let mut rng = rng();
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..500 {
            seen.insert(catalog.select_puzzle(Variant::A, &mut rng).unwrap().id().to_string());
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn select_puzzle_fails_for_unregistered_variant() {
        let mut catalog = Catalog::empty(CatalogKind::MemoryGrid);
        catalog.register(Variant::A, Catalog::memory_grid().puzzles(Variant::A)[0].clone());

        assert_eq!(
            catalog.select_puzzle(Variant::B, &mut rng()),
            Err(GameError::NoPuzzlesForVariant(Variant::B))
        );
    }

    #[test]
    fn definition_rejects_mismatched_target_count() {
        let err = PuzzleDefinition::grid("X", (2, 2), &[(0, 0)], &["a"], 1, 2).unwrap_err();
        assert_eq!(
            err,
            GameError::TargetCountMismatch {
                id: "X".to_string(),
                declared: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn definition_rejects_out_of_bounds_and_duplicate_targets() {
        assert_eq!(
            PuzzleDefinition::grid("X", (2, 2), &[(2, 0)], &["a"], 1, 1),
            Err(GameError::InvalidCoords)
        );
        assert_eq!(
            PuzzleDefinition::grid("X", (2, 2), &[(1, 1), (1, 1)], &["a"], 1, 2),
            Err(GameError::DuplicateTarget("X".to_string()))
        );
        assert_eq!(
            PuzzleDefinition::grid("X", (2, 2), &[(1, 1)], &[], 1, 1),
            Err(GameError::MissingFiller("X".to_string()))
        );
    }

    #[test]
    fn grid_materialization_cycles_filler_row_major() {
        let definition =
            PuzzleDefinition::grid("T", (2, 3), &[(0, 1), (1, 2)], &["a", "b"], 1, 2).unwrap();

        let instance = definition.materialize(&mut rng()).unwrap();

        let symbols: Vec<_> = instance.cells().map(|(_, symbol)| symbol).collect();
        assert_eq!(symbols, vec!["a", TARGET_SYMBOL, "b", "a", "b", TARGET_SYMBOL]);
        assert!(instance.is_target_cell((0, 1)));
        assert!(!instance.is_target_cell((0, 0)));
        assert_eq!(instance.size(), (2, 3));
    }

    #[test]
    fn grid_materialization_is_deterministic() {
        let definition = Catalog::memory_grid().puzzles(Variant::B)[2].clone();
        let first = definition.materialize(&mut SmallRng::seed_from_u64(1)).unwrap();
        let second = definition.materialize(&mut SmallRng::seed_from_u64(99)).unwrap();
        assert_eq!(first, second);
        let targets = first
            .cells()
            .filter(|&(_, symbol)| symbol == TARGET_SYMBOL)
            .count();
        assert_eq!(targets, 5);
    }

    #[test]
    fn letter_materialization_is_a_permutation() {
        let definition = Catalog::word_search().puzzles(Variant::B)[0].clone();

        let instance = definition.materialize(&mut rng()).unwrap();

        let mut shuffled: Vec<_> = instance.cells().map(|(_, s)| s.to_string()).collect();
        let mut original = definition.filler_symbols().to_vec();
        assert_eq!(instance.size(), (1, original.len() as Coord));
        shuffled.sort();
        original.sort();
        assert_eq!(shuffled, original);
    }

    #[test]
    fn target_words_match_case_insensitively() {
        let definition =
            PuzzleDefinition::letters("W", &["C", "O", "D", "E"], &["code"], 1, 1).unwrap();
        let instance = definition.materialize(&mut rng()).unwrap();

        assert_eq!(instance.target_word(" Code "), Some("CODE".to_string()));
        assert_eq!(instance.target_word("DECO"), None);
    }
}
