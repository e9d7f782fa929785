use {
    crate::error::{Error, Result},
    std::{
        fmt::{Debug, Formatter},
        mem,
        ops::{Index, IndexMut},
    },
};

/// Side length of the benchmark matrices. Two of them take ~656 MB.
pub const MATRIX_LEN: usize = 6400;

/// Side length of a tile in the blocked traversal.
pub const BLOCK_SIZE: usize = 8;

/// Value every cell of a fresh benchmark matrix holds.
pub const FILL_VALUE: i64 = 2;

/// A square matrix of `i64` stored row-major in one allocation.
#[derive(Clone, PartialEq, Eq)]
pub struct SquareMatrix {
    side: usize,
    cells: Box<[i64]>,
}

impl SquareMatrix {
    /// Number of cells of a `side`×`side` matrix, or `None` if its buffer could not be
    /// addressed.
    pub fn cell_count(side: usize) -> Option<usize> {
        let cells = side.checked_mul(side)?;
        let bytes = cells.checked_mul(mem::size_of::<i64>())?;
        (bytes <= isize::MAX as usize).then_some(cells)
    }

    fn checked_cell_count(side: usize) -> usize {
        match Self::cell_count(side) {
            Some(cells) => cells,
            None => panic!("matrix side {} is too large", side),
        }
    }

    /// Creates a `side`×`side` matrix with every cell set to `value`.
    pub fn filled(side: usize, value: i64) -> Self {
        Self {
            side,
            cells: vec![value; Self::checked_cell_count(side)].into_boxed_slice(),
        }
    }

    /// Creates a `side`×`side` matrix with cell `(row, col)` set to `f(row, col)`.
    pub fn from_fn(side: usize, mut f: impl FnMut(usize, usize) -> i64) -> Self {
        let cells = (0..Self::checked_cell_count(side))
            .map(|idx| f(idx / side, idx % side))
            .collect();
        Self { side, cells }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn row(&self, row: usize) -> &[i64] {
        &self.cells[row * self.side..(row + 1) * self.side]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [i64] {
        &mut self.cells[row * self.side..(row + 1) * self.side]
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[i64] {
        &self.cells
    }
}

impl Index<(usize, usize)> for SquareMatrix {
    type Output = i64;

    fn index(&self, (row, col): (usize, usize)) -> &i64 {
        assert!(col < self.side, "column {} out of bounds", col);
        &self.cells[row * self.side + col]
    }
}

impl IndexMut<(usize, usize)> for SquareMatrix {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut i64 {
        assert!(col < self.side, "column {} out of bounds", col);
        &mut self.cells[row * self.side + col]
    }
}

impl Debug for SquareMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.side > 8 {
            return f.debug_struct("SquareMatrix").field("side", &self.side).finish();
        }
        f.debug_list()
            .entries((0..self.side).map(|row| self.row(row)))
            .finish()
    }
}

/// Allocates a `side`×`side` matrix filled with [`FILL_VALUE`].
pub fn create_matrix(side: usize) -> SquareMatrix {
    SquareMatrix::filled(side, FILL_VALUE)
}

/// The two operands of a combination benchmark.
pub fn operands(side: usize) -> (SquareMatrix, SquareMatrix) {
    (create_matrix(side), create_matrix(side))
}

/// A block size that evenly divides a matrix side length.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tiling {
    side: usize,
    block: usize,
}

impl Tiling {
    pub fn new(side: usize, block: usize) -> Result<Self> {
        if block == 0 {
            return Err(Error::ZeroBlockSize);
        }
        if side % block != 0 {
            return Err(Error::BlockSizeMismatch { side, block });
        }
        Ok(Self { side, block })
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn block(&self) -> usize {
        self.block
    }

    /// Number of tiles along one dimension.
    pub fn tiles_per_side(&self) -> usize {
        self.side / self.block
    }
}

fn assert_same_side(a: &SquareMatrix, b: &SquareMatrix) {
    assert_eq!(
        a.side, b.side,
        "matrices of side {} and {} cannot be combined",
        a.side, b.side
    );
}

/// `a[i][j] += b[i][j]`, walking both matrices row by row.
pub fn combine(a: &mut SquareMatrix, b: &SquareMatrix) {
    assert_same_side(a, b);
    let n = a.side;
    for i in 0..n {
        for j in 0..n {
            a.cells[i * n + j] += b.cells[i * n + j];
        }
    }
}

/// `a[i][j] += b[j][i]`. The inner loop walks a column of `b`, one line per step.
pub fn combine_transposed(a: &mut SquareMatrix, b: &SquareMatrix) {
    assert_same_side(a, b);
    let n = a.side;
    for i in 0..n {
        for j in 0..n {
            a.cells[i * n + j] += b.cells[j * n + i];
        }
    }
}

/// Same result as [`combine_transposed`], traversed tile by tile.
///
/// A tile of `a` and the mirrored tile of `b` together touch `2 * block` lines, which stay
/// cached while the tile is processed in either order.
pub fn combine_transposed_blocked(a: &mut SquareMatrix, b: &SquareMatrix, tiling: Tiling) {
    assert_same_side(a, b);
    assert_eq!(
        a.side, tiling.side,
        "tiling for side {} used on matrix of side {}",
        tiling.side, a.side
    );
    let n = a.side;
    let block = tiling.block;
    for i in (0..n).step_by(block) {
        for j in (0..n).step_by(block) {
            for ii in i..i + block {
                for jj in j..j + block {
                    a.cells[ii * n + jj] += b.cells[jj * n + ii];
                }
            }
        }
    }
}

/// The three access orders under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Traversal {
    RowMajor,
    Transposed,
    TransposedBlocked(Tiling),
}

impl Traversal {
    pub fn all(tiling: Tiling) -> [Traversal; 3] {
        [
            Traversal::RowMajor,
            Traversal::Transposed,
            Traversal::TransposedBlocked(tiling),
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Traversal::RowMajor => "row_major",
            Traversal::Transposed => "transposed",
            Traversal::TransposedBlocked(_) => "transposed_blocked",
        }
    }

    pub fn apply(&self, a: &mut SquareMatrix, b: &SquareMatrix) {
        match *self {
            Traversal::RowMajor => combine(a, b),
            Traversal::Transposed => combine_transposed(a, b),
            Traversal::TransposedBlocked(tiling) => combine_transposed_blocked(a, b, tiling),
        }
    }
}
