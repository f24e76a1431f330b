//! 内置字段目录：学生视力档案中所有可参与组合查询的字段
//!
//! 字段顺序即字段下拉框的选项顺序，新增字段时注意插入位置。

use crate::field::{FieldSpec, ValueKind};

const SCHOOLS: [&str; 3] = ["华兴小学", "苏宁红军小学", "师大附小清华小学"];
const GRADES: [&str; 9] = [
    "一年级", "二年级", "三年级", "四年级", "五年级", "六年级", "七年级", "八年级", "九年级",
];
const DATA_YEARS: [&str; 6] = ["2023", "2024", "2025", "2026", "2027", "2028"];
const VISION_LEVELS: [&str; 3] = ["临床前期近视", "轻度近视", "中度近视"];
const EFFECTS: [&str; 3] = ["上升", "维持", "下降"];
const CLASS_COUNT: u32 = 15;
const INTERVENTION_ROUNDS: u32 = 16;

/// 结果表格默认展示的列
pub const DEFAULT_COLUMNS: [&str; 12] = [
    "school",
    "grade",
    "class_name",
    "name",
    "gender",
    "age",
    "vision_level",
    "interv_vision_level",
    "left_naked_change",
    "right_naked_change",
    "left_sphere_change",
    "right_sphere_change",
];

pub fn default_columns() -> Vec<String> {
    DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect()
}

fn text(key: &str, label: &str) -> FieldSpec {
    FieldSpec::new(key, label, ValueKind::Text)
}

fn range(key: &str, label: &str) -> FieldSpec {
    FieldSpec::new(key, label, ValueKind::NumberRange)
}

fn checkbox(key: &str, label: &str) -> FieldSpec {
    FieldSpec::new(key, label, ValueKind::Boolean)
}

fn dropdown(key: &str, label: &str, options: &[&str]) -> FieldSpec {
    FieldSpec::with_options(key, label, ValueKind::Dropdown, options.iter().copied())
}

fn multi(key: &str, label: &str, options: &[&str]) -> FieldSpec {
    FieldSpec::with_options(key, label, ValueKind::MultiSelect, options.iter().copied())
}

/// 左右眼成对的区间字段，键名为 `left_<suffix>` / `right_<suffix>`
fn eye_pair(suffix: &str, label: &str) -> [FieldSpec; 2] {
    [
        range(&format!("left_{}", suffix), &format!("左眼{}", label)),
        range(&format!("right_{}", suffix), &format!("右眼{}", label)),
    ]
}

pub fn builtin_fields() -> Vec<FieldSpec> {
    let classes: Vec<String> = (1..=CLASS_COUNT).map(|i| format!("{}班", i)).collect();
    let class_options: Vec<&str> = classes.iter().map(String::as_str).collect();

    let mut fields = vec![
        dropdown("data_year", "数据年份", &DATA_YEARS),
        text("education_id", "教育ID号"),
        dropdown("school", "学校", &SCHOOLS),
        dropdown("grade", "年级", &GRADES),
        dropdown("class_name", "班级", &class_options),
        text("name", "姓名"),
        text("id_card", "身份证号"),
        dropdown("gender", "性别", &["男", "女"]),
        range("age", "年龄"),
        dropdown("vision_level", "视力等级", &VISION_LEVELS),
        dropdown("interv_vision_level", "干预后视力等级", &VISION_LEVELS),
    ];

    // 视力及其变化
    for (suffix, label) in [
        ("eye_naked", "-裸眼视力"),
        ("eye_naked_interv", "-干预-裸眼视力"),
        ("naked_change", "裸眼视力变化"),
        ("sphere_change", "屈光-球镜变化"),
        ("cylinder_change", "屈光-柱镜变化"),
        ("axis_change", "屈光-轴位变化"),
    ] {
        fields.extend(eye_pair(suffix, label));
    }

    // 干预效果
    for (suffix, label) in [
        ("interv_effect", "视力干预效果"),
        ("sphere_effect", "球镜干预效果"),
        ("cylinder_effect", "柱镜干预效果"),
        ("axis_effect", "轴位干预效果"),
    ] {
        fields.push(multi(&format!("left_{}", suffix), &format!("左眼{}", label), &EFFECTS));
        fields.push(multi(&format!("right_{}", suffix), &format!("右眼{}", label), &EFFECTS));
    }

    for (suffix, label) in [
        ("eye_corrected", "-矫正视力"),
        ("keratometry_K1", "-角膜曲率K1"),
        ("keratometry_K2", "-角膜曲率K2"),
        ("axial_length", "-眼轴"),
    ] {
        fields.extend(eye_pair(suffix, label));
    }

    // 屈光、散瞳，以及各自的干预后数值；同一只眼的三项连续排列
    for (infix, label) in [
        ("", "屈光-"),
        ("dilated_", "散瞳-"),
    ] {
        for (side, side_label) in [("left", "左眼"), ("right", "右眼")] {
            for (item, item_label) in [("sphere", "球镜"), ("cylinder", "柱镜"), ("axis", "轴位")] {
                fields.push(range(
                    &format!("{}_{}{}", side, infix, item),
                    &format!("{}{}{}", side_label, label, item_label),
                ));
            }
        }
    }
    for (infix, label) in [
        ("", "屈光-干预-"),
        ("dilated_", "散瞳-干预-"),
    ] {
        for (side, side_label) in [("left", "左眼"), ("right", "右眼")] {
            for (item, item_label) in [("sphere", "球镜"), ("cylinder", "柱镜"), ("axis", "轴位")] {
                fields.push(range(
                    &format!("{}_{}{}_interv", side, infix, item),
                    &format!("{}{}{}", side_label, label, item_label),
                ));
            }
        }
    }

    // 干预方式
    fields.extend([
        checkbox("guasha", "刮痧"),
        checkbox("aigiu", "艾灸"),
        checkbox("zhongyao_xunzheng", "中药熏蒸"),
        checkbox("rejiu_training", "热灸训练"),
        checkbox("xuewei_tiefu", "穴位贴敷"),
        checkbox("reci_pulse", "热磁脉冲"),
        checkbox("baoguan", "拔罐"),
        checkbox("frame_glasses", "框架眼镜"),
        checkbox("contact_lenses", "隐形眼镜"),
        checkbox("night_orthokeratology", "夜戴角膜塑型镜"),
    ]);
    for round in 1..=INTERVENTION_ROUNDS {
        fields.push(checkbox(&format!("interv{}", round), &format!("第{}次干预", round)));
    }

    // 档案信息
    fields.extend([
        text("birthday", "出生日期"),
        text("phone", "联系电话"),
        text("region", "区域"),
        text("contact_address", "联系地址"),
        text("parent_name", "家长姓名"),
        text("parent_phone", "家长电话"),
        text("diet_preference", "饮食偏好"),
        text("exercise_preference", "运动偏好"),
        text("health_education", "健康教育"),
        text("past_history", "既往史"),
        text("family_history", "家族史"),
        dropdown("premature", "是否早产", &["是", "否"]),
        text("allergy", "过敏史"),
    ]);

    fields
}
