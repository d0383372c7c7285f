// src/diff.rs
//
// Best-effort comparison of two character data revisions. Findings that are
// known to be expected variance (guaranteed follow-ups, knockdowns) are
// suppressed according to `DiffConfig`; anything not covered still reports.

use crate::config::{DiffConfig, HitStunCheck};
use crate::error::{RegressError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Moves and hit tables of one character at one version
#[derive(Debug, Clone, Default)]
pub struct CharacterData {
    pub moves: Map<String, Value>,
    pub hits: Map<String, Value>,
}

impl CharacterData {
    /// Reads `<data_dir>/<name>/<name><version>_moves.json` and `_hit.json`.
    pub fn load(data_dir: &Path, name: &str, version: u32) -> Result<Self> {
        let dir = data_dir.join(name);
        let moves = read_object(&dir.join(format!("{name}{version}_moves.json")))?;
        let hits = read_object(&dir.join(format!("{name}{version}_hit.json")))?;
        Ok(Self { moves, hits })
    }

    pub fn from_values(moves: Value, hits: Value) -> Self {
        let as_map = |v: Value| match v {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { moves: as_map(moves), hits: as_map(hits) }
    }
}

fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let text = fs::read_to_string(path).map_err(|e| RegressError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| RegressError::json(path.display().to_string(), e))
}

/// Inclusive frame range during which a move has live attack boxes
pub type ActiveWindow = Option<(i64, i64)>;

#[derive(Debug, Clone, PartialEq)]
pub enum Finding {
    ActiveWindow { move_id: String, old: ActiveWindow, new: ActiveWindow },
    HitCount { move_id: String, old: usize, new: usize },
    HitField { move_id: String, hit_id: String, entry: String, field: String, old: Value, new: Value },
    Scaling { move_id: String, field: String, old: Value, new: Value },
    HitStun { move_id: String, hit_id: String, hit_index: String, description: String, expected: i64, actual: i64 },
    MoveTime { hit_index: String, entry: String, hit_stun: Value, move_time: Value },
}

fn window(w: &ActiveWindow) -> String {
    match w {
        Some((start, end)) => format!("{start}-{end}"),
        None => "never".into(),
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::ActiveWindow { move_id, old, new } => {
                write!(f, "{move_id} was active from {}, now active from {}", window(old), window(new))
            }
            Finding::HitCount { move_id, old, new } => write!(f, "{move_id} different hit count ({old} -> {new})"),
            Finding::HitField { move_id, hit_id, entry, field, old, new } => {
                write!(f, "{move_id} hit {hit_id} on {entry} {field} was {old}, now {new}")
            }
            Finding::Scaling { move_id, field, old, new } => write!(f, "{move_id} {field} was {old}, now {new}"),
            Finding::HitStun { move_id, hit_id, hit_index, description, expected, actual } => write!(
                f,
                "{move_id} hit {hit_id} (dt {hit_index}): {description} should be {expected}, but is {actual}"
            ),
            Finding::MoveTime { hit_index, entry, hit_stun, move_time } => {
                write!(f, "dt {hit_index} param {entry}: HitStun {hit_stun} != MoveTime {move_time}")
            }
        }
    }
}

pub struct DiffEngine<'a> {
    config: &'a DiffConfig,
}

impl<'a> DiffEngine<'a> {
    pub fn new(config: &'a DiffConfig) -> Self {
        Self { config }
    }

    /// Everything that changed from `old` to `new`, plus timing violations in `new`.
    pub fn diff(&self, old: &CharacterData, new: &CharacterData) -> Vec<Finding> {
        let mut findings = self.compare_moves(old, new);
        findings.extend(self.check_timing(new));
        findings
    }

    pub fn compare_moves(&self, old: &CharacterData, new: &CharacterData) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (move_id, new_move) in &new.moves {
            let Some(old_move) = old.moves.get(move_id) else { continue };

            let (old_window, new_window) = (self.active_window(old_move), self.active_window(new_move));
            if old_window != new_window {
                findings.push(Finding::ActiveWindow { move_id: move_id.clone(), old: old_window, new: new_window });
            }

            let old_hits = self.hit_info(old_move, &old.hits);
            let new_hits = self.hit_info(new_move, &new.hits);
            if old_hits.len() != new_hits.len() {
                findings.push(Finding::HitCount { move_id: move_id.clone(), old: old_hits.len(), new: new_hits.len() });
            }
            for entry in &self.config.param_entries {
                self.compare_hit_info(move_id, &old_hits, &new_hits, &entry.key, &entry.label, &mut findings);
            }
            self.compare_scaling(move_id, old_move, new_move, &mut findings);
        }
        findings
    }

    fn attack_keys<'v>(&self, mv: &'v Value) -> impl Iterator<Item = &'v Map<String, Value>> + 'v {
        mv.get("AttackCollisionKey")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|keys| keys.values())
            .filter_map(Value::as_object)
            .filter(|key| key.contains_key("CollisionType"))
    }

    fn is_active(&self, key: &Map<String, Value>) -> bool {
        key.get("CollisionType")
            .and_then(Value::as_i64)
            .is_some_and(|t| self.config.active_collision_types.contains(&t))
    }

    /// Earliest start and latest end over the move's active collision entries.
    pub fn active_window(&self, mv: &Value) -> ActiveWindow {
        self.attack_keys(mv)
            .filter(|key| self.is_active(key))
            .filter_map(|key| Some((key.get("_StartFrame")?.as_i64()?, key.get("_EndFrame")?.as_i64()?)))
            .reduce(|(lo, hi), (start, end)| (lo.min(start), hi.max(end)))
    }

    /// Hit records referenced by the move, keyed by their `HitID`.
    fn hit_info<'v>(&self, mv: &Value, hits: &'v Map<String, Value>) -> BTreeMap<String, &'v Value> {
        let mut info = BTreeMap::new();
        for key in self.attack_keys(mv).filter(|key| self.is_active(key)) {
            let Some(index) = key.get("AttackDataListIndex").and_then(Value::as_i64) else { continue };
            if index == -1 {
                continue;
            }
            let (Some(hit_id), Some(record)) = (key.get("HitID"), hits.get(&format!("{index:03}"))) else {
                continue;
            };
            info.insert(hit_id.to_string(), record);
        }
        info
    }

    fn compare_hit_info(
        &self,
        move_id: &str,
        old_hits: &BTreeMap<String, &Value>,
        new_hits: &BTreeMap<String, &Value>,
        entry: &str,
        label: &str,
        findings: &mut Vec<Finding>,
    ) {
        let params = |hit: &Value| hit.get("param").and_then(|p| p.get(entry)).and_then(Value::as_object).cloned();
        for (hit_id, new_hit) in new_hits {
            let (Some(new_params), Some(old_params)) = (params(*new_hit), old_hits.get(hit_id).and_then(|h| params(*h)))
            else {
                continue;
            };
            let mut report = |field: String, old: &Value, new: &Value| {
                findings.push(Finding::HitField {
                    move_id: move_id.to_string(),
                    hit_id: hit_id.clone(),
                    entry: label.to_string(),
                    field,
                    old: old.clone(),
                    new: new.clone(),
                });
            };
            for (field, new_value) in &new_params {
                if self.config.ignored_fields.contains(field) {
                    continue;
                }
                let Some(old_value) = old_params.get(field) else { continue };
                match new_value {
                    Value::Object(nested) => {
                        for (sub, new_sub) in nested {
                            match old_value.get(sub) {
                                Some(old_sub) if old_sub != new_sub => report(format!("{field}.{sub}"), old_sub, new_sub),
                                _ => {}
                            }
                        }
                    }
                    _ if new_value != old_value => report(field.clone(), old_value, new_value),
                    _ => {}
                }
            }
        }
    }

    fn compare_scaling(&self, move_id: &str, old_move: &Value, new_move: &Value, findings: &mut Vec<Finding>) {
        let combo = |mv: &Value, field: &str| mv.pointer(&format!("/fab/Combo/{field}")).cloned();
        for field in &self.config.scaling_fields {
            if let (Some(old), Some(new)) = (combo(old_move, field), combo(new_move, field)) {
                if old != new {
                    findings.push(Finding::Scaling { move_id: move_id.to_string(), field: field.clone(), old, new });
                }
            }
        }
    }

    /// Timing relationships inside each hit record of one revision.
    pub fn check_timing(&self, data: &CharacterData) -> Vec<Finding> {
        let mut findings = Vec::new();
        for (hit_index, hit) in &data.hits {
            let Some(params) = hit.get("param").and_then(Value::as_object) else { continue };
            for (entry, param) in params {
                if let (Some(hit_stun), Some(move_time)) = (param.get("HitStun"), param.get("MoveTime")) {
                    if hit_stun != move_time {
                        findings.push(Finding::MoveTime {
                            hit_index: hit_index.clone(),
                            entry: entry.clone(),
                            hit_stun: hit_stun.clone(),
                            move_time: move_time.clone(),
                        });
                    }
                }
            }
            for check in &self.config.hit_stun_checks {
                if let Some(finding) = self.check_hit_stun(&data.moves, hit_index, params, check) {
                    findings.push(finding);
                }
            }
        }
        findings
    }

    fn check_hit_stun(
        &self,
        moves: &Map<String, Value>,
        hit_index: &str,
        params: &Map<String, Value>,
        check: &HitStunCheck,
    ) -> Option<Finding> {
        let stun = |entry: &str| params.get(entry)?.get("HitStun")?.as_i64();
        let actual = stun(check.right.as_str())? - stun(check.left.as_str())?;
        if actual == check.expected {
            return None;
        }
        let (move_id, hit_id) = self.find_move_by_hit(moves, hit_index)?;
        if check.description.contains("block") && self.config.follow_up_moves.contains(&move_id) {
            log::debug!("{move_id}: guaranteed follow-up, ignoring {}", check.description);
            return None;
        }
        let knockdown = params
            .get(&check.right)
            .and_then(|p| p.pointer("/MoveDest/y"))
            .and_then(Value::as_f64)
            .is_some_and(|y| y > 0.0);
        if knockdown {
            return None;
        }
        Some(Finding::HitStun {
            move_id,
            hit_id,
            hit_index: hit_index.to_string(),
            description: check.description.clone(),
            expected: check.expected,
            actual,
        })
    }

    /// First move with a strike box pointing at `hit_index`, and that box's `HitID`.
    fn find_move_by_hit(&self, moves: &Map<String, Value>, hit_index: &str) -> Option<(String, String)> {
        let index: i64 = hit_index.parse().ok()?;
        moves.iter().find_map(|(move_id, mv)| {
            self.attack_keys(mv)
                .find(|key| {
                    key.get("CollisionType").and_then(Value::as_i64) == Some(0)
                        && key.get("AttackDataListIndex").and_then(Value::as_i64) == Some(index)
                })
                .map(|key| (move_id.clone(), key.get("HitID").map(Value::to_string).unwrap_or_default()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strike(index: i64, hit_id: i64, start: i64, end: i64) -> Value {
        json!({ "CollisionType": 0, "AttackDataListIndex": index, "HitID": hit_id, "_StartFrame": start, "_EndFrame": end })
    }

    fn data(moves: Value, hits: Value) -> CharacterData {
        CharacterData::from_values(moves, hits)
    }

    fn hit_record(block_stun: i64, burnout_stun: i64) -> Value {
        json!({ "param": {
            "04": { "HitStun": burnout_stun, "MoveTime": burnout_stun, "MoveDest": { "x": 0, "y": 0 } },
            "16": { "HitStun": block_stun, "MoveTime": block_stun, "MoveDest": { "x": 0, "y": 0 }, "CurveOwnID": 1 },
        }})
    }

    #[test]
    fn reports_leaf_field_change_but_not_identifier_fields() {
        let config = DiffConfig::default();
        let engine = DiffEngine::new(&config);
        let moves = json!({ "ATK_5LP": { "AttackCollisionKey": { "0": strike(3, 0, 5, 7), "_count": 1 } } });
        let mut old_hits = json!({ "003": hit_record(10, 6) });
        let mut new_hits = old_hits.clone();
        new_hits["003"]["param"]["16"]["Damage"] = json!(500);
        old_hits["003"]["param"]["16"]["Damage"] = json!(400);
        new_hits["003"]["param"]["16"]["CurveOwnID"] = json!(99);

        let findings = engine.compare_moves(&data(moves.clone(), old_hits), &data(moves, new_hits));
        assert_eq!(findings.len(), 1);
        let Finding::HitField { field, entry, old, new, .. } = &findings[0] else { panic!("{findings:?}") };
        assert_eq!((field.as_str(), entry.as_str()), ("Damage", "block"));
        assert_eq!((old, new), (&json!(400), &json!(500)));
    }

    #[test]
    fn recurses_one_nested_level() {
        let config = DiffConfig::default();
        let engine = DiffEngine::new(&config);
        let moves = json!({ "ATK_2MK": { "AttackCollisionKey": { "0": strike(1, 0, 8, 9) } } });
        let old_hits = json!({ "001": hit_record(10, 6) });
        let mut new_hits = old_hits.clone();
        new_hits["001"]["param"]["04"]["MoveDest"]["x"] = json!(12);
        let findings = engine.compare_moves(&data(moves.clone(), old_hits), &data(moves, new_hits));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].to_string(), "ATK_2MK hit 0 on burnout block MoveDest.x was 0, now 12");
    }

    #[test]
    fn active_window_spans_strike_and_projectile_boxes() {
        let config = DiffConfig::default();
        let engine = DiffEngine::new(&config);
        let old = json!({ "ATK": { "AttackCollisionKey": { "0": strike(-1, 0, 5, 7) } } });
        let mut throw_box = strike(-1, 1, 2, 3);
        throw_box["CollisionType"] = json!(2);
        let mut projectile = strike(-1, 1, 6, 10);
        projectile["CollisionType"] = json!(1);
        let new = json!({ "ATK": { "AttackCollisionKey": { "0": strike(-1, 0, 5, 7), "1": projectile, "2": throw_box } } });
        assert_eq!(engine.active_window(&new["ATK"]), Some((5, 10)));
        assert_eq!(engine.active_window(&json!({})), None);

        let findings = engine.compare_moves(&data(old, json!({})), &data(new, json!({})));
        assert_eq!(findings, vec![Finding::ActiveWindow { move_id: "ATK".into(), old: Some((5, 7)), new: Some((5, 10)) }]);
    }

    #[test]
    fn hit_count_and_scaling_changes_are_reported() {
        let config = DiffConfig::default();
        let engine = DiffEngine::new(&config);
        let old = json!({ "SA1": {
            "AttackCollisionKey": { "0": strike(1, 0, 5, 7) },
            "fab": { "Combo": { "ComboScaling": 10, "InstScaling": 0, "_StartScaling": 0 } } } });
        let new = json!({ "SA1": {
            "AttackCollisionKey": { "0": strike(1, 0, 5, 7), "1": strike(2, 1, 5, 7) },
            "fab": { "Combo": { "ComboScaling": 20, "InstScaling": 0, "_StartScaling": 0 } } } });
        let hits = json!({ "001": hit_record(10, 6), "002": hit_record(10, 6) });
        let findings = engine.compare_moves(&data(old, hits.clone()), &data(new, hits));
        assert!(findings.contains(&Finding::HitCount { move_id: "SA1".into(), old: 1, new: 2 }));
        assert!(findings.contains(&Finding::Scaling {
            move_id: "SA1".into(),
            field: "ComboScaling".into(),
            old: json!(10),
            new: json!(20)
        }));
    }

    #[test]
    fn burnout_block_offset_violation_is_reported() {
        let config = DiffConfig { hit_stun_checks: DiffConfig::default().hit_stun_checks[..1].to_vec(), ..DiffConfig::default() };
        let engine = DiffEngine::new(&config);
        let moves = json!({ "ATK_5HP": { "AttackCollisionKey": { "0": strike(4, 0, 9, 11) } } });
        let findings = engine.check_timing(&data(moves, json!({ "004": hit_record(7, 10) })));
        assert_eq!(
            findings,
            vec![Finding::HitStun {
                move_id: "ATK_5HP".into(),
                hit_id: "0".into(),
                hit_index: "004".into(),
                description: "burnout stand block vs stand block".into(),
                expected: -4,
                actual: -3,
            }]
        );
    }

    #[test]
    fn follow_up_and_knockdown_suppress_timing_findings() {
        let config = DiffConfig { hit_stun_checks: DiffConfig::default().hit_stun_checks[..1].to_vec(), ..DiffConfig::default() };
        let engine = DiffEngine::new(&config);

        let follow_up = json!({ "ATK_CTA(1)": { "AttackCollisionKey": { "0": strike(4, 0, 9, 11) } } });
        assert!(engine.check_timing(&data(follow_up, json!({ "004": hit_record(7, 10) }))).is_empty());

        let moves = json!({ "ATK_5HP": { "AttackCollisionKey": { "0": strike(4, 0, 9, 11) } } });
        let mut knockdown = hit_record(7, 10);
        knockdown["param"]["16"]["MoveDest"]["y"] = json!(35);
        assert!(engine.check_timing(&data(moves.clone(), json!({ "004": knockdown }))).is_empty());

        // no move references the record
        assert!(engine.check_timing(&data(moves, json!({ "009": hit_record(7, 10) }))).is_empty());
    }

    #[test]
    fn owning_move_is_the_first_in_file_order() {
        let config = DiffConfig { hit_stun_checks: DiffConfig::default().hit_stun_checks[..1].to_vec(), ..DiffConfig::default() };
        let engine = DiffEngine::new(&config);
        let dir = tempfile::tempdir().unwrap();
        let ken = dir.path().join("ken");
        fs::create_dir_all(&ken).unwrap();
        let strike = r#"{"CollisionType": 0, "AttackDataListIndex": 4, "HitID": 0, "_StartFrame": 9, "_EndFrame": 11}"#;
        fs::write(
            ken.join("ken38_moves.json"),
            format!(
                r#"{{"ATK_CTA(1)": {{"AttackCollisionKey": {{"0": {strike}}}}}, "ATK_5HP": {{"AttackCollisionKey": {{"0": {strike}}}}}}}"#
            ),
        )
        .unwrap();
        fs::write(ken.join("ken38_hit.json"), json!({ "004": hit_record(7, 10) }).to_string()).unwrap();

        let loaded = CharacterData::load(dir.path(), "ken", 38).unwrap();
        assert_eq!(loaded.moves.keys().next().map(String::as_str), Some("ATK_CTA(1)"));
        assert!(engine.check_timing(&loaded).is_empty());
    }

    #[test]
    fn move_time_must_match_hit_stun() {
        let config = DiffConfig { hit_stun_checks: Vec::new(), ..DiffConfig::default() };
        let engine = DiffEngine::new(&config);
        let mut record = hit_record(14, 10);
        record["param"]["16"]["MoveTime"] = json!(13);
        let findings = engine.check_timing(&data(json!({}), json!({ "001": record })));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].to_string(), "dt 001 param 16: HitStun 14 != MoveTime 13");
    }

    #[test]
    fn loads_character_files_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ryu = dir.path().join("ryu");
        fs::create_dir_all(&ryu).unwrap();
        fs::write(ryu.join("ryu38_moves.json"), r#"{"ATK": {}}"#).unwrap();
        fs::write(ryu.join("ryu38_hit.json"), r#"{"001": {"param": {}}}"#).unwrap();
        let loaded = CharacterData::load(dir.path(), "ryu", 38).unwrap();
        assert!(loaded.moves.contains_key("ATK"));
        assert!(loaded.hits.contains_key("001"));
        assert!(CharacterData::load(dir.path(), "ryu", 39).is_err());
    }
}
