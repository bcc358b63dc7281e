//! 类别标签表 (MobileNet-SSD label taxonomy)
//!
//! 设备端检测网络输出整数类别ID。ID在进入系统时就转换成 `Label`,
//! 未知ID在边界处被拒绝,融合阶段不会再遇到越界索引。

use crate::error::{FusionError, FusionResult};
use phf::phf_map;
use std::fmt;

/// MobileNet-SSD (VOC) 的21个类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Background,
    Aeroplane,
    Bicycle,
    Bird,
    Boat,
    Bottle,
    Bus,
    Car,
    Cat,
    Chair,
    Cow,
    DiningTable,
    Dog,
    Horse,
    Motorbike,
    Person,
    PottedPlant,
    Sheep,
    Sofa,
    Train,
    TvMonitor,
}

static LABELS: [Label; 21] = [
    Label::Background,
    Label::Aeroplane,
    Label::Bicycle,
    Label::Bird,
    Label::Boat,
    Label::Bottle,
    Label::Bus,
    Label::Car,
    Label::Cat,
    Label::Chair,
    Label::Cow,
    Label::DiningTable,
    Label::Dog,
    Label::Horse,
    Label::Motorbike,
    Label::Person,
    Label::PottedPlant,
    Label::Sheep,
    Label::Sofa,
    Label::Train,
    Label::TvMonitor,
];

static LABEL_INDICES: phf::Map<&'static str, usize> = phf_map! {
    "background" => 0,
    "aeroplane" => 1,
    "bicycle" => 2,
    "bird" => 3,
    "boat" => 4,
    "bottle" => 5,
    "bus" => 6,
    "car" => 7,
    "cat" => 8,
    "chair" => 9,
    "cow" => 10,
    "diningtable" => 11,
    "dog" => 12,
    "horse" => 13,
    "motorbike" => 14,
    "person" => 15,
    "pottedplant" => 16,
    "sheep" => 17,
    "sofa" => 18,
    "train" => 19,
    "tvmonitor" => 20,
};

/// 默认渲染白名单
pub const DEFAULT_INCLUDED: [&str; 8] = [
    "person",
    "car",
    "motorbike",
    "bicycle",
    "bus",
    "aeroplane",
    "background",
    "train",
];

impl Label {
    pub fn all() -> &'static [Label] {
        &LABELS
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Label::Background => "background",
            Label::Aeroplane => "aeroplane",
            Label::Bicycle => "bicycle",
            Label::Bird => "bird",
            Label::Boat => "boat",
            Label::Bottle => "bottle",
            Label::Bus => "bus",
            Label::Car => "car",
            Label::Cat => "cat",
            Label::Chair => "chair",
            Label::Cow => "cow",
            Label::DiningTable => "diningtable",
            Label::Dog => "dog",
            Label::Horse => "horse",
            Label::Motorbike => "motorbike",
            Label::Person => "person",
            Label::PottedPlant => "pottedplant",
            Label::Sheep => "sheep",
            Label::Sofa => "sofa",
            Label::Train => "train",
            Label::TvMonitor => "tvmonitor",
        }
    }

    /// 按类别名查找 (大小写不敏感)
    pub fn from_name(name: &str) -> FusionResult<Self> {
        LABEL_INDICES
            .get(name.trim().to_lowercase().as_str())
            .map(|&idx| LABELS[idx])
            .ok_or_else(|| FusionError::UnknownLabelName(name.to_string()))
    }
}

impl TryFrom<u32> for Label {
    type Error = FusionError;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        LABELS
            .get(id as usize)
            .copied()
            .ok_or(FusionError::UnknownLabelId(id))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 渲染白名单 (Allow-list of labels to render)
///
/// 构造时校验每个类别名,未知名称直接作为配置错误返回。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    allowed: [bool; 21],
}

impl AllowList {
    pub fn from_names<I, S>(names: I) -> FusionResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed = [false; 21];
        for name in names {
            let label = Label::from_name(name.as_ref())?;
            allowed[label as usize] = true;
        }
        Ok(Self { allowed })
    }

    pub fn all() -> Self {
        Self { allowed: [true; 21] }
    }

    pub fn contains(&self, label: Label) -> bool {
        self.allowed[label as usize]
    }
}

impl Default for AllowList {
    fn default() -> Self {
        let mut allowed = [false; 21];
        for name in DEFAULT_INCLUDED {
            if let Some(&idx) = LABEL_INDICES.get(name) {
                allowed[idx] = true;
            }
        }
        Self { allowed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_name_mapping_is_total() {
        for (id, label) in Label::all().iter().enumerate() {
            assert_eq!(label.id() as usize, id);
            assert_eq!(Label::try_from(id as u32).unwrap(), *label);
            assert_eq!(Label::from_name(label.name()).unwrap(), *label);
        }
    }

    #[test]
    fn test_unknown_id_rejected() {
        match Label::try_from(21) {
            Err(FusionError::UnknownLabelId(21)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_name_rejected() {
        assert!(AllowList::from_names(["person", "unicorn"]).is_err());
        assert!(Label::from_name(" Person ").is_ok());
    }

    #[test]
    fn test_default_allow_list() {
        let allow = AllowList::default();
        assert!(allow.contains(Label::Person));
        assert!(allow.contains(Label::Background));
        assert!(allow.contains(Label::Train));
        assert!(!allow.contains(Label::Dog));
        let allowed = Label::all().iter().filter(|l| allow.contains(**l)).count();
        assert_eq!(allowed, DEFAULT_INCLUDED.len());
    }
}
