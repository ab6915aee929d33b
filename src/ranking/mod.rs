//! Song ranking.
//!
//! Scores candidate songs against a reference context and returns the best
//! ones. Two contexts are supported:
//!
//! - **Seed mode**: songs similar to one reference song
//! - **Batch mode**: songs similar to a batch of recently listened songs
//!
//! Candidates are filtered before scoring: the reference songs and any
//! explicitly excluded ids are dropped, and only candidates in the reference
//! language survive. Language mismatch is a hard filter, not a penalty.
//!
//! [`trending`] is separate and needs no context: most popular first.

pub mod jitter;

use std::collections::{HashMap, HashSet};

use crate::config::RankingConfig;
use crate::model::{ScoredCandidate, Song, SongId, normalize_tag};

pub use jitter::Jitter;

/// Per-mode score weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    /// Per shared tag
    pub tag: f64,
    /// Same artist (seed) or artist in batch (batch)
    pub artist: f64,
    /// Same language (seed) or language in batch (batch)
    pub language: f64,
    pub likes_log: f64,
    pub views_log: f64,
    /// Viewer liked the candidate
    pub liked: f64,
    /// Width of the uniform noise interval
    pub jitter_range: f64,
}

impl Weights {
    pub const SEED: Weights = Weights {
        tag: 15.0,
        artist: 25.0,
        language: 10.0,
        likes_log: 2.0,
        views_log: 1.0,
        liked: 8.0,
        jitter_range: 3.0,
    };

    pub const BATCH: Weights = Weights {
        tag: 25.0,
        artist: 30.0,
        language: 15.0,
        likes_log: 2.0,
        views_log: 1.0,
        liked: 10.0,
        jitter_range: 2.0,
    };
}

/// Seed mode listening bonus: two points per minute, capped.
const MINUTES_WEIGHT: f64 = 2.0;
const MINUTES_CAP: f64 = 20.0;

/// What a history batch looks like as a whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchProfile {
    pub tags: HashSet<String>,
    pub artists: HashSet<String>,
    pub languages: HashSet<String>,
    /// Most frequent language; ties go to the earliest song in the batch
    pub dominant_language: Option<String>,
}

impl BatchProfile {
    pub fn from_songs(batch: &[Song]) -> Self {
        let mut profile = Self::default();
        let mut counts: Vec<(String, usize)> = Vec::new();

        for song in batch {
            profile.tags.extend(song.tags.iter().map(|t| normalize_tag(t)));
            profile.artists.insert(song.artist.clone());
            let language = normalize_language(&song.language);
            profile.languages.insert(language.clone());
            match counts.iter_mut().find(|(l, _)| *l == language) {
                Some((_, n)) => *n += 1,
                None => counts.push((language, 1)),
            }
        }

        // max_by_key keeps the last maximum; iterate reversed to keep the first
        profile.dominant_language = counts
            .into_iter()
            .rev()
            .max_by_key(|(_, n)| *n)
            .map(|(l, _)| l);
        profile
    }
}

fn normalize_language(language: &str) -> String {
    language.trim().to_lowercase()
}

fn same_language(a: &str, b: &str) -> bool {
    normalize_language(a) == normalize_language(b)
}

/// Number of distinct candidate tags found in `reference`.
fn tag_overlap(candidate: &Song, reference: &HashSet<String>) -> usize {
    candidate
        .tags
        .iter()
        .map(|t| normalize_tag(t))
        .collect::<HashSet<_>>()
        .intersection(reference)
        .count()
}

fn popularity_score(candidate: &Song, weights: &Weights) -> f64 {
    (candidate.likes as f64).ln_1p() * weights.likes_log
        + (candidate.views as f64).ln_1p() * weights.views_log
}

/// Deterministic seed mode score (everything but the noise).
pub fn seed_score(seed: &Song, candidate: &Song, minutes_listened: f64) -> f64 {
    let w = &Weights::SEED;
    let seed_tags: HashSet<String> = seed.tags.iter().map(|t| normalize_tag(t)).collect();

    let mut score = tag_overlap(candidate, &seed_tags) as f64 * w.tag;
    if candidate.artist == seed.artist {
        score += w.artist;
    }
    if same_language(&candidate.language, &seed.language) {
        score += w.language;
    }
    score += (MINUTES_WEIGHT * minutes_listened.max(0.0)).min(MINUTES_CAP);
    score += popularity_score(candidate, w);
    if candidate.liked {
        score += w.liked;
    }
    score
}

/// Deterministic batch mode score (everything but the noise).
pub fn batch_score(profile: &BatchProfile, candidate: &Song) -> f64 {
    let w = &Weights::BATCH;

    let mut score = tag_overlap(candidate, &profile.tags) as f64 * w.tag;
    if profile.artists.contains(&candidate.artist) {
        score += w.artist;
    }
    if profile
        .languages
        .contains(&normalize_language(&candidate.language))
    {
        score += w.language;
    }
    score += popularity_score(candidate, w);
    if candidate.liked {
        score += w.liked;
    }
    score
}

/// Ranks candidate songs. Holds the noise source; everything else is pure.
#[derive(Debug)]
pub struct ScoringEngine {
    jitter: Jitter,
}

impl ScoringEngine {
    pub fn new(jitter: Jitter) -> Self {
        Self { jitter }
    }

    /// Engine configured from the `[ranking]` section.
    pub fn from_config(config: &RankingConfig) -> Self {
        Self::new(Jitter::from_config(config.jitter_scale, config.jitter_seed))
    }

    /// Engine without noise. Rankings are fully deterministic.
    pub fn deterministic() -> Self {
        Self::new(Jitter::disabled())
    }

    /// Top `limit` candidates similar to `seed`.
    ///
    /// `minutes` maps song ids to the viewer's cumulative listening minutes.
    pub fn rank_for_seed(
        &self,
        seed: &Song,
        candidates: &[Song],
        minutes: &HashMap<SongId, f64>,
        exclude: &HashSet<SongId>,
        limit: usize,
    ) -> Vec<ScoredCandidate> {
        let scored = candidates
            .iter()
            .filter(|c| c.id != seed.id && !exclude.contains(&c.id))
            .filter(|c| same_language(&c.language, &seed.language))
            .map(|c| {
                let listened = minutes.get(&c.id).copied().unwrap_or(0.0);
                ScoredCandidate {
                    song: c.clone(),
                    score: seed_score(seed, c, listened)
                        + self.jitter.sample(Weights::SEED.jitter_range),
                }
            })
            .collect();
        top_k(scored, limit)
    }

    /// Top `limit` candidates similar to a batch of recently listened songs.
    ///
    /// An empty batch has no reference language, so nothing is returned.
    pub fn rank_for_batch(
        &self,
        batch: &[Song],
        candidates: &[Song],
        exclude: &HashSet<SongId>,
        limit: usize,
    ) -> Vec<ScoredCandidate> {
        let profile = BatchProfile::from_songs(batch);
        let Some(language) = profile.dominant_language.as_deref() else {
            return Vec::new();
        };
        let batch_ids: HashSet<SongId> = batch.iter().map(|s| s.id).collect();

        let scored = candidates
            .iter()
            .filter(|c| !batch_ids.contains(&c.id) && !exclude.contains(&c.id))
            .filter(|c| normalize_language(&c.language) == language)
            .map(|c| ScoredCandidate {
                song: c.clone(),
                score: batch_score(&profile, c) + self.jitter.sample(Weights::BATCH.jitter_range),
            })
            .collect();
        top_k(scored, limit)
    }
}

/// Highest scores first. The sort is stable so equal scores keep input order.
fn top_k(mut scored: Vec<ScoredCandidate>, limit: usize) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(limit);
    scored
}

/// Most popular songs by views + likes. Ties keep catalog order.
pub fn trending(songs: &[Song], limit: usize) -> Vec<Song> {
    let mut ranked: Vec<&Song> = songs.iter().collect();
    ranked.sort_by(|a, b| b.popularity().cmp(&a.popularity()));
    ranked.into_iter().take(limit).cloned().collect()
}
