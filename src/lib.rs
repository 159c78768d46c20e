//! # Online Run-Length BWT
//!
//! *The Burrows-Wheeler transform of a growing text, one symbol at a
//! time, stored run-length encoded.*
//!
//! ## Intuition First
//!
//! Imagine proofreading a book that is still being written. Every time a
//! sentence arrives you file it into a gigantic sorted card index — and
//! the index is so repetitive that you only record "the next 40 cards all
//! say the same letter". Appending one sentence must not mean re-sorting
//! the whole index: you need to know *where* the new card goes (a rank
//! query over what is already filed) and the filing itself must keep the
//! "40 cards alike" summaries intact (an insert into a run).
//!
//! This crate is that card index. It maintains, after every inserted
//! symbol, the run-length encoded BWT of everything fed so far.
//!
//! ## The Problem
//!
//! Static BWT construction via suffix arrays wants the whole text up
//! front and $O(n)$ working space. Collections of sequences (a FASTA
//! file of millions of reads) are better served by *online* construction:
//! insert each symbol at the row given by LF from the current end-marker,
//! in a structure that supports `rank`, `select` and `insert` all in
//! logarithmic time — and whose size is proportional to the number of
//! *runs* $r$, not the text length $n$.
//!
//! ## Historical Context
//!
//! ```text
//! 1994  Burrows-Wheeler  The block-sorting transform
//! 2000  Ferragina-Manzini FM-index: rank over the BWT replaces the text
//! 2010  Salson et al.     Dynamic/updatable BWT via insertions
//! 2012  Cox et al. (BEETL) SAP intervals: same-as-previous placement
//!                          freedom compresses collections further
//! 2018  Ohno et al.       Online RLBWT in O(r) words with B+trees
//! ```
//!
//! The SAP observation is the interesting twist: when many suffixes tie
//! (identical up to the symbol about to be inserted), *any* row in the
//! tying range yields a valid BWT — so choose the row that merges into
//! an existing run instead of splitting one.
//!
//! ## Mathematical Formulation
//!
//! The text is held as runs $(c_1^{w_1}, c_2^{w_2}, \dots, c_r^{w_r})$
//! in three coupled partial-sum B+trees: by text position (mixed tree),
//! by character (separated trees), and by character order (alphabet
//! tree). For an insertion at position $p$:
//! $\mathrm{LF}(p) = C[c] + \mathrm{rank}_c(p)$, where $C[c]$ falls out
//! of the alphabet tree and $\mathrm{rank}_c$ out of the separated tree.
//!
//! ## Complexity Analysis
//!
//! - **Time**: $O(\log r)$ per rank/select/insert tree walk, with an
//!   $O(\log^2 r)$ amortised term for the order-maintenance labels that
//!   keep the per-character trees sorted.
//! - **Space**: $O(r)$ words, with run weights and cross-links bit-packed
//!   to their current magnitude.
//!
//! ## What Could Go Wrong
//!
//! 1. **Cross-link drift**: the mixed and separated trees point into each
//!    other by arena slot; every shift, split or relabel must rewrite the
//!    reverse links of exactly what moved. `DynRle::check_integrity`
//!    walks all of it.
//! 2. **Label exhaustion**: adjacent-integer labels leave no room for a
//!    newcomer; the tag-range allocator widens a window and respreads it
//!    rather than renumbering everything.
//!
//! ## Implementation Notes
//!
//! This crate provides:
//! - **[`OnlineRlbwt`]**: the builder — `extend` (exact) and
//!   `sap_extend` (run-minimising), LF maps, inversion, serialisation.
//! - **[`DynRle`]**: the dynamic run-length string underneath.
//! - **[`fasta`]**: flattening of multi-sequence input the way the
//!   builder expects it (reversed records, marker-terminated).
//!
//! ## References
//!
//! - Burrows, M., & Wheeler, D. (1994). "A Block-sorting Lossless Data
//!   Compression Algorithm."
//! - Cox, A. J., et al. (2012). "Large-scale compression of genomic
//!   sequence databases with the Burrows-Wheeler transform."
//! - Ohno, T., et al. (2018). "A faster implementation of online
//!   RLBWT and its application to LZ77 parsing."

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blockvec;
pub mod bottoms;
pub mod btree;
pub mod dynrle;
pub mod error;
pub mod fasta;
pub mod rlbwt;
pub mod tra;
pub mod wbits;

pub use dynrle::DynRle;
pub use error::Error;
pub use rlbwt::OnlineRlbwt;
