//! 字段脱敏
//! 对任意 JSON 值做深度掩码（mask）和深度删除（omit），始终返回新值，不修改入参

use serde_json::{Map, Value};

/// 掩码替换值
pub const MASK: &str = "XXXXX";

/// 深度掩码：任意层级（包括数组内的对象）键名完全匹配的字段，值替换为 `MASK`
pub fn mask(value: &Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return value.clone();
    }

    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| {
                    let masked = if is_listed(key, fields) {
                        Value::String(MASK.to_string())
                    } else {
                        mask(child, fields)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|item| mask(item, fields)).collect()),
        leaf => leaf.clone(),
    }
}

/// 深度删除：删除匹配的键，递归进入嵌套对象和数组
pub fn omit(value: &Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return value.clone();
    }

    match value {
        Value::Object(map) => Value::Object(omit_map(map, fields)),
        Value::Array(items) => Value::Array(items.iter().map(|item| omit(item, fields)).collect()),
        leaf => leaf.clone(),
    }
}

fn omit_map(map: &Map<String, Value>, fields: &[String]) -> Map<String, Value> {
    map.iter()
        .filter(|(key, _)| !is_listed(key, fields))
        .map(|(key, child)| (key.clone(), omit(child, fields)))
        .collect()
}

fn is_listed(key: &str, fields: &[String]) -> bool {
    fields.iter().any(|field| field == key)
}
