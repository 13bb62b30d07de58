//! Weighted fusion of title, synopsis and genre signals for movie search

use crate::{retrieve::rank_descending, Error, Result};

/// Weight of the title similarity
pub const TITLE_WEIGHT: f32 = 0.4;
/// Weight of the synopsis similarity
pub const SYNOPSIS_WEIGHT: f32 = 0.4;
/// Weight of the normalized genre overlap
pub const GENRE_WEIGHT: f32 = 0.2;

/// Scale overlap counts into `[0, 1]` by dividing by the maximum.
///
/// All zeros when the maximum is 0.
#[must_use]
pub fn normalize_overlap(counts: &[usize]) -> Vec<f32> {
    let max = counts.iter().copied().max().unwrap_or(0);
    if max == 0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|&c| c as f32 / max as f32).collect()
}

/// `0.4 * title + 0.4 * synopsis + 0.2 * genre_norm`
#[must_use]
pub fn hybrid_score(title: f32, synopsis: f32, genre_norm: f32) -> f32 {
    TITLE_WEIGHT * title + SYNOPSIS_WEIGHT * synopsis + GENRE_WEIGHT * genre_norm
}

/// Linear combination of per-document title, synopsis and genre scores.
///
/// The weights are the fixed [`TITLE_WEIGHT`], [`SYNOPSIS_WEIGHT`] and
/// [`GENRE_WEIGHT`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HybridScorer;

fn check_len(len: usize, n: usize) -> Result<()> {
    if len != n {
        return Err(Error::DimensionMismatch {
            expected: n,
            actual: len,
        });
    }
    Ok(())
}

#[allow(clippy::unused_self)]
impl HybridScorer {
    /// Fused score for each of `n` documents.
    ///
    /// Unset inputs count as zero vectors. Genre overlap counts are
    /// normalized with [`normalize_overlap`] first.
    pub fn score(
        &self,
        title: Option<&[f32]>,
        synopsis: Option<&[f32]>,
        genres: Option<&[usize]>,
        n: usize,
    ) -> Result<Vec<f32>> {
        if let Some(title) = title {
            check_len(title.len(), n)?;
        }
        if let Some(synopsis) = synopsis {
            check_len(synopsis.len(), n)?;
        }
        let genre_norm = match genres {
            Some(counts) => {
                check_len(counts.len(), n)?;
                normalize_overlap(counts)
            }
            None => vec![0.0; n],
        };

        Ok((0..n)
            .map(|i| {
                let t = title.map_or(0.0, |s| s[i]);
                let s = synopsis.map_or(0.0, |s| s[i]);
                hybrid_score(t, s, genre_norm[i])
            })
            .collect())
    }

    /// Fused scores stably sorted descending, sliced to `top_k`
    pub fn rank(
        &self,
        title: Option<&[f32]>,
        synopsis: Option<&[f32]>,
        genres: Option<&[usize]>,
        n: usize,
        top_k: usize,
    ) -> Result<Vec<(usize, f32)>> {
        if top_k == 0 {
            return Err(Error::Query("top_k must be at least 1".to_string()));
        }
        let mut ranked = rank_descending(&self.score(title, synopsis, genres, n)?);
        ranked.truncate(top_k);
        Ok(ranked)
    }
}
