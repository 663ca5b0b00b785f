//! Sélection du prochain segment à diffuser
//!
//! Deux régimes selon la nature de la playlist :
//!
//! - **Live** : on examine une fenêtre des W segments les plus récents,
//!   du plus récent au plus ancien, et on retourne le premier absent de
//!   l'historique. Les playlists live perdent leurs vieux segments ; la
//!   fenêtre borne le travail et saute naturellement le contenu tombé de
//!   la playlist avant d'avoir été joué, au lieu de courir après de
//!   l'audio périmé.
//! - **VOD** : un curseur strictement croissant parcourt la playlist ;
//!   chaque segment est retourné exactement une fois, dans l'ordre, puis
//!   la fin de playlist est signalée.

use pmohls::{PlaylistSnapshot, SegmentRef};

use crate::history::PlayedHistory;

/// Taille par défaut de la fenêtre de sélection live
pub const DEFAULT_LIVE_WINDOW: usize = 5;

/// Résultat d'une sélection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Segment à diffuser, avec le curseur VOD déjà avancé au-delà.
    Next { segment: SegmentRef, cursor: usize },
    /// Live : toute la fenêtre récente a déjà été jouée ; attendre le
    /// prochain rechargement (backoff d'un demi-intervalle).
    CaughtUp,
    /// VOD : playlist épuisée. Fin de flux propre, pas une erreur.
    Exhausted,
}

/// Choisit le prochain segment du snapshot courant.
///
/// `cursor` n'est utilisé qu'en mode VOD ; en live il est retourné tel
/// quel. L'appelant marque le segment joué APRÈS la diffusion (ou après
/// un échec de transcodage, pour ne pas retenter en boucle un segment
/// cassé).
pub fn select(
    snapshot: &PlaylistSnapshot,
    history: &PlayedHistory,
    cursor: usize,
    live_window: usize,
) -> Selection {
    if snapshot.is_finite {
        select_vod(snapshot, history, cursor)
    } else {
        select_live(snapshot, history, cursor, live_window)
    }
}

/// Balayage du plus récent au plus ancien dans la fenêtre.
///
/// L'ordre est canonique : l'index `len-1` (le plus frais) est examiné
/// en premier, la fraîcheur prime sur la continuité.
fn select_live(
    snapshot: &PlaylistSnapshot,
    history: &PlayedHistory,
    cursor: usize,
    live_window: usize,
) -> Selection {
    let len = snapshot.segments.len();
    let start = len.saturating_sub(live_window.max(1));
    for segment in snapshot.segments[start..].iter().rev() {
        if !history.contains(segment.uri_str()) {
            return Selection::Next {
                segment: segment.clone(),
                cursor,
            };
        }
    }
    Selection::CaughtUp
}

/// Avance le curseur au-delà des segments déjà joués (un rechargement
/// peut relister un segment déjà diffusé), puis retourne le suivant.
fn select_vod(snapshot: &PlaylistSnapshot, history: &PlayedHistory, cursor: usize) -> Selection {
    let mut cursor = cursor;
    while cursor < snapshot.segments.len() {
        let segment = &snapshot.segments[cursor];
        if history.contains(segment.uri_str()) {
            cursor += 1;
            continue;
        }
        return Selection::Next {
            segment: segment.clone(),
            cursor: cursor + 1,
        };
    }
    Selection::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn seg(name: &str) -> SegmentRef {
        SegmentRef::new(
            Url::parse(&format!("http://radio.test/{name}.ts")).unwrap(),
            None,
        )
    }

    fn snapshot(names: &[&str], finite: bool) -> PlaylistSnapshot {
        PlaylistSnapshot {
            segments: names.iter().map(|n| seg(n)).collect(),
            is_finite: finite,
        }
    }

    fn name_of(selection: &Selection) -> String {
        match selection {
            Selection::Next { segment, .. } => segment
                .uri
                .path_segments()
                .unwrap()
                .next_back()
                .unwrap()
                .trim_end_matches(".ts")
                .to_string(),
            other => panic!("expected a segment, got {other:?}"),
        }
    }

    #[test]
    fn test_live_picks_the_newest_unplayed_segment() {
        let snap = snapshot(&["A", "B", "C", "D", "E"], false);
        let history = PlayedHistory::new(100);
        let selection = select(&snap, &history, 0, 5);
        assert_eq!(name_of(&selection), "E");
    }

    #[test]
    fn test_live_scans_newest_first_after_a_reload() {
        // [A..E] joué jusqu'à E, puis la playlist glisse vers [B..F] :
        // le balayage du plus récent au plus ancien trouve F avant E.
        let mut history = PlayedHistory::new(100);
        history.insert("http://radio.test/E.ts");

        let snap = snapshot(&["B", "C", "D", "E", "F"], false);
        let selection = select(&snap, &history, 0, 5);
        assert_eq!(name_of(&selection), "F");
    }

    #[test]
    fn test_live_window_ignores_segments_older_than_w() {
        // Fenêtre de 2 : seuls D et E sont considérés.
        let mut history = PlayedHistory::new(100);
        history.insert("http://radio.test/D.ts");
        history.insert("http://radio.test/E.ts");

        let snap = snapshot(&["A", "B", "C", "D", "E"], false);
        assert_eq!(select(&snap, &history, 0, 2), Selection::CaughtUp);
    }

    #[test]
    fn test_live_caught_up_when_the_whole_window_is_played() {
        let mut history = PlayedHistory::new(100);
        for name in ["A", "B", "C"] {
            history.insert(&format!("http://radio.test/{name}.ts"));
        }
        let snap = snapshot(&["A", "B", "C"], false);
        assert_eq!(select(&snap, &history, 0, 5), Selection::CaughtUp);
    }

    #[test]
    fn test_live_never_reselects_a_uri_still_in_history() {
        let mut history = PlayedHistory::new(100);
        let snap = snapshot(&["A", "B", "C", "D", "E"], false);
        let mut played = Vec::new();
        loop {
            match select(&snap, &history, 0, 5) {
                Selection::Next { segment, .. } => {
                    assert!(!played.contains(&segment.uri_str().to_string()));
                    played.push(segment.uri_str().to_string());
                    history.insert(segment.uri_str());
                }
                Selection::CaughtUp => break,
                Selection::Exhausted => panic!("live playlist cannot be exhausted"),
            }
        }
        assert_eq!(played.len(), 5);
    }

    #[test]
    fn test_vod_returns_segments_in_order_exactly_once() {
        let snap = snapshot(&["X", "Y"], true);
        let mut history = PlayedHistory::new(100);

        let first = select(&snap, &history, 0, 5);
        assert_eq!(name_of(&first), "X");
        let Selection::Next { segment, cursor } = first else {
            unreachable!()
        };
        assert_eq!(cursor, 1);
        history.insert(segment.uri_str());

        let second = select(&snap, &history, cursor, 5);
        assert_eq!(name_of(&second), "Y");
        let Selection::Next { segment, cursor } = second else {
            unreachable!()
        };
        assert_eq!(cursor, 2);
        history.insert(segment.uri_str());

        assert_eq!(select(&snap, &history, cursor, 5), Selection::Exhausted);
    }

    #[test]
    fn test_vod_skips_entries_already_played_after_a_reload() {
        // Un rechargement a relisté X alors qu'il est déjà joué : le
        // curseur le saute au lieu de le rejouer.
        let snap = snapshot(&["X", "Y"], true);
        let mut history = PlayedHistory::new(100);
        history.insert("http://radio.test/X.ts");

        let selection = select(&snap, &history, 0, 5);
        assert_eq!(name_of(&selection), "Y");
    }
}
