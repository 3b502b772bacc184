//! Strategic merge of partial Kubernetes objects
//!
//! Maps merge recursively and `null` deletes a key. Lists of well-known
//! fields are merged element-wise by their merge key (containers by `name`,
//! volume mounts by `mountPath`, ...); any other list is replaced. The
//! `$patch: replace` and `$patch: delete` directives are honored on maps and
//! on keyed list elements.

use serde_yaml::{Mapping, Value};

const PATCH_DIRECTIVE: &str = "$patch";

/// Merge key for list fields that Kubernetes merges element-wise
fn merge_key(field: &str, items: &[Value]) -> Option<&'static str> {
    match field {
        "containers" | "initContainers" | "ephemeralContainers" | "volumes" | "env"
        | "imagePullSecrets" => Some("name"),
        "volumeMounts" => Some("mountPath"),
        "volumeDevices" => Some("devicePath"),
        "hostAliases" => Some("ip"),
        "conditions" => Some("type"),
        "topologySpreadConstraints" => Some("topologyKey"),
        "ports" => {
            let container_ports = items.iter().any(|i| i.get("containerPort").is_some());
            Some(if container_ports { "containerPort" } else { "port" })
        }
        _ => None,
    }
}

/// What a patch map asks to happen to its target
pub(crate) fn directive(patch: &Value) -> Option<&str> {
    patch.get(PATCH_DIRECTIVE).and_then(Value::as_str)
}

/// Apply `patch` onto `target` in place
pub fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Mapping(target_map), Value::Mapping(patch_map)) => {
            if directive(patch) == Some("replace") {
                *target_map = strip_directives_map(patch_map);
                return;
            }
            merge_mapping(target_map, patch_map);
        }
        (target, patch) => *target = strip_directives(patch),
    }
}

fn merge_mapping(target: &mut Mapping, patch: &Mapping) {
    for (key, patch_value) in patch {
        let field = key.as_str().unwrap_or_default();
        if field.starts_with('$') {
            continue;
        }

        if patch_value.is_null() || directive(patch_value) == Some("delete") {
            target.remove(key);
            continue;
        }

        match target.get_mut(key) {
            Some(Value::Sequence(target_items)) if patch_value.is_sequence() => {
                let patch_items = patch_value.as_sequence().map(Vec::as_slice).unwrap_or_default();
                merge_list(field, target_items, patch_items);
            }
            Some(existing) => merge(existing, patch_value),
            None => {
                target.insert(key.clone(), strip_directives(patch_value));
            }
        }
    }
}

fn merge_list(field: &str, target: &mut Vec<Value>, patch: &[Value]) {
    let Some(key) = merge_key(field, target) else {
        *target = patch.iter().map(strip_directives).collect();
        return;
    };

    for item in patch {
        let Some(id) = item.get(key) else {
            target.push(strip_directives(item));
            continue;
        };

        let position = target.iter().position(|t| t.get(key) == Some(id));
        match (position, directive(item)) {
            (Some(pos), Some("delete")) => {
                target.remove(pos);
            }
            (None, Some("delete")) => {}
            (Some(pos), _) => merge(&mut target[pos], item),
            (None, _) => target.push(strip_directives(item)),
        }
    }
}

/// Copy of a value with every `$patch`-style directive removed
pub fn strip_directives(value: &Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(strip_directives_map(map)),
        Value::Sequence(items) => Value::Sequence(items.iter().map(strip_directives).collect()),
        other => other.clone(),
    }
}

fn strip_directives_map(map: &Mapping) -> Mapping {
    map.iter()
        .filter(|(k, _)| !k.as_str().is_some_and(|k| k.starts_with('$')))
        .map(|(k, v)| (k.clone(), strip_directives(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_merges_containers_by_name() {
        let mut target = yaml(
            r#"
spec:
  template:
    spec:
      containers:
        - name: app
          image: app:1
        - name: proxy
          image: proxy:1
"#,
        );
        let patch = yaml(
            r#"
spec:
  template:
    spec:
      containers:
        - name: app
          image: app:2
        - name: logger
          image: logger:1
"#,
        );

        merge(&mut target, &patch);

        let containers = target["spec"]["template"]["spec"]["containers"]
            .as_sequence()
            .unwrap();
        assert_eq!(containers.len(), 3);
        assert_eq!(containers[0]["image"], yaml("app:2"));
        assert_eq!(containers[1]["image"], yaml("proxy:1"));
        assert_eq!(containers[2]["name"], yaml("logger"));
    }

    #[test]
    fn test_null_deletes_key() {
        let mut target = yaml("metadata:\n  labels:\n    a: '1'\n    b: '2'\n");
        merge(&mut target, &yaml("metadata:\n  labels:\n    a: null\n"));
        assert!(target["metadata"]["labels"].get("a").is_none());
        assert_eq!(target["metadata"]["labels"]["b"], yaml("'2'"));
    }

    #[test]
    fn test_unkeyed_list_is_replaced() {
        let mut target = yaml("args: [a, b]\n");
        merge(&mut target, &yaml("args: [c]\n"));
        assert_eq!(target["args"], yaml("[c]"));
    }

    #[test]
    fn test_delete_directive_on_list_element() {
        let mut target = yaml("env:\n  - name: A\n    value: '1'\n  - name: B\n    value: '2'\n");
        merge(&mut target, &yaml("env:\n  - name: A\n    $patch: delete\n"));
        let env = target["env"].as_sequence().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0]["name"], yaml("B"));
    }

    #[test]
    fn test_replace_directive_on_map() {
        let mut target = yaml("data:\n  a: '1'\n  b: '2'\n");
        merge(&mut target, &yaml("data:\n  $patch: replace\n  c: '3'\n"));
        assert_eq!(target["data"], yaml("c: '3'"));
    }

    #[test]
    fn test_service_ports_merge_by_port() {
        let mut target = yaml("ports:\n  - port: 80\n    name: http\n");
        merge(&mut target, &yaml("ports:\n  - port: 80\n    targetPort: 8080\n  - port: 443\n"));
        let ports = target["ports"].as_sequence().unwrap();
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0]["targetPort"], yaml("8080"));
        assert_eq!(ports[0]["name"], yaml("http"));
    }
}
