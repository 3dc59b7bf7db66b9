//! Pitch and variability buckets and the animal-sound label table.
//!
//! Bucket intervals are inclusive on both ends. Adjacent pitch buckets share
//! their boundary, and a value sitting exactly on it resolves to the lower
//! bucket because lookups return the first match in ascending order.

pub const PITCH_START_HZ: u32 = 50;
pub const PITCH_END_HZ: u32 = 430;
pub const PITCH_STEP_HZ: u32 = 20;
pub const PITCH_BUCKET_COUNT: usize = ((PITCH_END_HZ - PITCH_START_HZ) / PITCH_STEP_HZ) as usize;

pub const UNKNOWN_PITCH: &str = "알 수 없는 피치";
pub const UNKNOWN_VARIABILITY: &str = "알 수 없는 변동성";
pub const UNKNOWN_SOUND: &str = "알 수 없는 소리";

/// Variability buckets over the pitch standard deviation, in lookup order
const VARIABILITY_RANGES: [(&str, f64, f64); 3] = [
    ("단조로운", 0.0, 20.0),
    ("보통 변동", 21.0, 50.0),
    ("다이나믹한", 51.0, 100.0),
];

/// Labels indexed by `[pitch bucket][variability bucket]`
const SOUND_LABELS: [[&str; 3]; PITCH_BUCKET_COUNT] = [
    // 50~70Hz
    ["하품하는 아기 하마", "깊은 굴속에서 우는 아기 곰", "포효하는 사자"],
    // 70~90Hz
    ["단조롭게 으르렁거리는 팬더", "무언가를 쫓는 스컹크", "지나가는 기차에 울부 짖는 늑대"],
    // 90~110Hz
    ["나뭇가지에 앉은 부엉이", "심술 난 코뿔소", "분노에 찬 코끼리"],
    // 110~130Hz
    ["그윽한 고양이", "밥 달라고 애교 부리는 강아지", "주인에게 투정 부리는 코끼리"],
    // 130~150Hz
    ["조용히 멍 때리는 시바견", "신나게 뛰어 노는 돼지", "정신없이 짖는 댕댕이"],
    // 150~170Hz
    ["소리를 억누르는 펭귄", "애처롭게 우는 아기 원숭이", "경보를 알리는 침팬지"],
    // 170~190Hz
    ["귀여운 비명을 지르는 다람쥐", "숲 속을 뛰는 고라니", "위협하는 고릴라"],
    // 190~210Hz
    ["하염없이 우는 길 잃은 염소", "엄마를 찾는 새끼 양", "산 정상에서 짖는 염소"],
    // 210~230Hz
    ["수풀 속에 숨은 토끼", "겁에 질린 사슴", "겁 먹은 생쥐"],
    // 230~250Hz
    ["정신없는 원숭이", "심장이 쿵쾅거리는 사슴", "흥분한 토끼"],
    // 250~270Hz
    ["조심스럽게 움직이는 기린", "심심해서 우는 어린 사슴", "지쳐서 우는 기린"],
    // 270~290Hz
    ["한가로운 새의 비행", "엄마를 찾는 아기 새", "새의 폭풍 비행"],
    // 290~310Hz
    ["신호 보내는 사슴", "하품하는 어린 양", "질주하는 사슴"],
    // 310~330Hz
    ["풀 뜯어먹는 토끼", "길을 잃어 울부 짖는 토끼", "위협하는 토끼"],
    // 330~350Hz
    ["숲 속을 걷는 코끼리", "물가에 멈춰선 코끼리", "경계하는 코끼리"],
    // 350~370Hz
    ["정처없이 떠도는 하마", "배고파서 우는 하마", "호수에 빠진 하마"],
    // 370~390Hz
    ["졸음에 겨운 새", "엄마 젖을 찾는 새", "겁 먹은 새"],
    // 390~410Hz
    ["평화롭게 밥을 먹는 비둘기", "날지 못해 슬피 우는 비둘기", "비명을 지르는 비둘기"],
    // 410~430Hz
    ["평화로운 닭", "병아리를 잃어버린 닭", "세상에서 제일 화가 난 닭"],
];

/// A named, closed interval
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub label: String,
    pub min: f64,
    pub max: f64,
}

impl Bucket {
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Resolved categories for one voice clip
#[derive(Debug, Clone, PartialEq)]
pub struct Categorization {
    pub tone: String,
    pub variability: String,
    pub sound: String,
}

/// Maps (median pitch, pitch spread) to a descriptive animal sound.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct CategoryMapper {
    pitch_buckets: Vec<Bucket>,
    variability_buckets: Vec<Bucket>,
}

impl Default for CategoryMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl CategoryMapper {
    pub fn new() -> Self {
        let pitch_buckets = (PITCH_START_HZ..PITCH_END_HZ)
            .step_by(PITCH_STEP_HZ as usize)
            .map(|low| {
                let high = low + PITCH_STEP_HZ;
                Bucket {
                    label: format!("{}~{}Hz", low, high),
                    min: low as f64,
                    max: high as f64,
                }
            })
            .collect();

        let variability_buckets = VARIABILITY_RANGES
            .iter()
            .map(|&(label, min, max)| Bucket {
                label: label.to_string(),
                min,
                max,
            })
            .collect();

        Self {
            pitch_buckets,
            variability_buckets,
        }
    }

    pub fn pitch_buckets(&self) -> &[Bucket] {
        &self.pitch_buckets
    }

    pub fn variability_buckets(&self) -> &[Bucket] {
        &self.variability_buckets
    }

    /// Index of the first pitch bucket containing `hz`
    pub fn pitch_index(&self, hz: f64) -> Option<usize> {
        self.pitch_buckets.iter().position(|b| b.contains(hz))
    }

    /// Index of the first variability bucket containing `std_hz`
    pub fn variability_index(&self, std_hz: f64) -> Option<usize> {
        self.variability_buckets.iter().position(|b| b.contains(std_hz))
    }

    /// Look up a label by bucket names, `UNKNOWN_SOUND` when either name is
    /// not one of the table's buckets.
    pub fn sound_for(&self, tone: &str, variability: &str) -> &'static str {
        let pitch = self.pitch_buckets.iter().position(|b| b.label == tone);
        let spread = self.variability_buckets.iter().position(|b| b.label == variability);
        match (pitch, spread) {
            (Some(p), Some(v)) => SOUND_LABELS[p][v],
            _ => UNKNOWN_SOUND,
        }
    }

    pub fn categorize(&self, median_hz: f64, std_hz: f64) -> Categorization {
        let pitch = self.pitch_index(median_hz);
        let spread = self.variability_index(std_hz);

        let tone = pitch
            .map(|i| self.pitch_buckets[i].label.clone())
            .unwrap_or_else(|| UNKNOWN_PITCH.to_string());
        let variability = spread
            .map(|i| self.variability_buckets[i].label.clone())
            .unwrap_or_else(|| UNKNOWN_VARIABILITY.to_string());
        let sound = match (pitch, spread) {
            (Some(p), Some(v)) => SOUND_LABELS[p][v],
            _ => UNKNOWN_SOUND,
        };

        Categorization {
            tone,
            variability,
            sound: sound.to_string(),
        }
    }
}
