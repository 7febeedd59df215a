use serde::{Deserialize, Serialize};

pub const DEFAULT_GROUP_COLOR: &str = "#3B82F6";

/// 任务分组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGroup {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// `#RRGGBB`
    pub color: String,
}

/// 创建分组请求
#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl NewTaskGroup {
    pub fn color_or_default(&self) -> String {
        self.color
            .clone()
            .unwrap_or_else(|| DEFAULT_GROUP_COLOR.to_string())
    }
}

/// 分组修改请求，未提供的字段保持不变
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskGroupPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl TaskGroupPatch {
    pub fn apply(&self, group: &mut TaskGroup) {
        if let Some(name) = &self.name {
            group.name = name.clone();
        }
        if let Some(description) = &self.description {
            group.description = Some(description.clone());
        }
        if let Some(color) = &self.color {
            group.color = color.clone();
        }
    }
}

/// 进程 -> 分组 的归属关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAssignment {
    pub process_id: u32,
    pub group_id: Option<i64>,
}

/// 校验 `#RRGGBB` 格式的颜色
pub fn is_valid_color(color: &str) -> bool {
    match color.strip_prefix('#') {
        Some(hex) => hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_validation() {
        assert!(is_valid_color("#3B82F6"));
        assert!(is_valid_color("#abcdef"));
        assert!(!is_valid_color("3B82F6"));
        assert!(!is_valid_color("#3B82F"));
        assert!(!is_valid_color("#GGGGGG"));
    }

    #[test]
    fn test_patch_keeps_missing_fields() {
        let mut group = TaskGroup {
            id: 1,
            name: "web".into(),
            description: Some("frontends".into()),
            color: DEFAULT_GROUP_COLOR.into(),
        };
        let patch = TaskGroupPatch {
            color: Some("#10B981".into()),
            ..Default::default()
        };
        patch.apply(&mut group);
        assert_eq!(group.name, "web");
        assert_eq!(group.description.as_deref(), Some("frontends"));
        assert_eq!(group.color, "#10B981");
    }
}
