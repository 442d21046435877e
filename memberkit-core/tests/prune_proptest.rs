use memberkit_core::manifest::prune;
use proptest::prelude::*;
use toml_edit::{Array, DocumentMut, InlineTable, Item, Table, Value};

#[derive(Debug, Clone)]
enum Node {
    Int(i64),
    Bool(bool),
    Str(String),
    Array(Vec<Node>),
    Table(Vec<(String, Node)>),
}

fn gen_node() -> impl Strategy<Value = Node> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Node::Int),
        any::<bool>().prop_map(Node::Bool),
        "[a-z]{0,4}".prop_map(Node::Str),
    ];
    leaf.prop_recursive(4, 48, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Node::Array),
            prop::collection::vec(("[a-z]{1,3}", inner), 0..4).prop_map(Node::Table),
        ]
    })
}

fn gen_document() -> impl Strategy<Value = DocumentMut> {
    prop::collection::vec(("[a-z]{1,3}", gen_node()), 0..6).prop_map(|entries| {
        let mut document = DocumentMut::new();
        for (key, node) in entries {
            document.insert(&key, to_item(&node));
        }
        document
    })
}

fn to_item(node: &Node) -> Item {
    match node {
        Node::Table(entries) => {
            let mut table = Table::new();
            for (key, child) in entries {
                table.insert(key, to_item(child));
            }
            Item::Table(table)
        }
        other => Item::Value(to_value(other)),
    }
}

fn to_value(node: &Node) -> Value {
    match node {
        Node::Int(i) => Value::from(*i),
        Node::Bool(b) => Value::from(*b),
        Node::Str(s) => Value::from(s.as_str()),
        Node::Array(items) => {
            let mut array = Array::new();
            for item in items {
                array.push(to_value(item));
            }
            Value::Array(array)
        }
        Node::Table(entries) => {
            let mut table = InlineTable::new();
            for (key, child) in entries {
                table.insert(key, to_value(child));
            }
            Value::InlineTable(table)
        }
    }
}

fn count_scalars_item(item: &Item) -> usize {
    match item {
        Item::Table(table) => table.iter().map(|(_, item)| count_scalars_item(item)).sum(),
        Item::ArrayOfTables(tables) => tables
            .iter()
            .flat_map(|table| table.iter())
            .map(|(_, item)| count_scalars_item(item))
            .sum(),
        Item::Value(value) => count_scalars_value(value),
        Item::None => 0,
    }
}

fn count_scalars_value(value: &Value) -> usize {
    match value {
        Value::Array(array) => array.iter().map(count_scalars_value).sum(),
        Value::InlineTable(table) => table.iter().map(|(_, v)| count_scalars_value(v)).sum(),
        _ => 1,
    }
}

fn has_empty_container_item(item: &Item) -> bool {
    match item {
        Item::Table(table) => {
            table.is_empty() || table.iter().any(|(_, item)| has_empty_container_item(item))
        }
        Item::ArrayOfTables(tables) => tables.is_empty(),
        Item::Value(value) => has_empty_container_value(value),
        Item::None => false,
    }
}

fn has_empty_container_value(value: &Value) -> bool {
    match value {
        Value::Array(array) => array.is_empty() || array.iter().any(has_empty_container_value),
        Value::InlineTable(table) => {
            table.is_empty() || table.iter().any(|(_, v)| has_empty_container_value(v))
        }
        _ => false,
    }
}

proptest! {
    #[test]
    fn test_prune_leaves_no_empty_containers(mut document in gen_document()) {
        prune(document.as_table_mut());
        for (_, item) in document.iter() {
            prop_assert!(!has_empty_container_item(item));
        }
    }

    #[test]
    fn test_prune_keeps_every_scalar(mut document in gen_document()) {
        let before = count_scalars_item(document.as_item());
        prune(document.as_table_mut());
        let after = count_scalars_item(document.as_item());
        prop_assert_eq!(before, after);
    }

    #[test]
    fn test_prune_is_idempotent(mut document in gen_document()) {
        prune(document.as_table_mut());
        let once = document.to_string();
        prune(document.as_table_mut());
        prop_assert_eq!(once, document.to_string());
    }
}
