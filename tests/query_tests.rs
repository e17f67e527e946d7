#[cfg(test)]
mod unit_tests {
    use sacred_browser::{
        errors::QueryError,
        query::{HELP_TEXT, is_empty_query, parse_query},
    };
    use serde_json::json;

    #[test]
    fn test_empty_text() {
        assert_eq!(parse_query("").unwrap(), json!({}));
        assert_eq!(parse_query("\n   \n# only a comment\n").unwrap(), json!({}));
        assert!(is_empty_query(&parse_query("").unwrap()));
    }

    #[test]
    fn test_single_conditions() {
        println!("== Single Conditions ==");

        let query = parse_query("lr: 0.01\nepochs : 10\noptimizer: adam\nuse_bias: True\ndrop: none").unwrap();
        assert_eq!(
            query,
            json!({"$and": [
                {"config.lr": 0.01},
                {"config.epochs": 10},
                {"config.optimizer": "adam"},
                {"config.use_bias": true},
                {"config.drop": null},
            ]})
        );
        assert!(!is_empty_query(&query));

        println!("== Single Conditions == success");
    }

    #[test]
    fn test_nested_field_name() {
        let query = parse_query("model.layers: 3").unwrap();
        assert_eq!(query, json!({"$and": [{"config.model.layers": 3}]}));
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let query = parse_query("path: /data:raw").unwrap();
        assert_eq!(query, json!({"$and": [{"config.path": "/data:raw"}]}));
    }

    #[test]
    fn test_alternatives() {
        let query = parse_query("seed: [1, 2, three]").unwrap();
        assert_eq!(
            query,
            json!({"$and": [
                {"$or": [
                    {"config.seed": 1},
                    {"config.seed": 2},
                    {"config.seed": "three"},
                ]},
            ]})
        );
    }

    #[test]
    fn test_single_alternative_collapses() {
        let query = parse_query("seed: [7]").unwrap();
        assert_eq!(query, json!({"$and": [{"config.seed": 7}]}));
    }

    #[test]
    fn test_regex_and_missing_field() {
        let query = parse_query("name: /res.*net/\ndropout: ---").unwrap();
        assert_eq!(
            query,
            json!({"$and": [
                {"config.name": {"$regex": "res.*net"}},
                {"config.dropout": {"$exists": false}},
            ]})
        );
    }

    #[test]
    fn test_comments_keep_line_numbers() {
        let err = parse_query("# comment\nlr: 1\nbroken line").unwrap_err();
        assert_eq!(err, QueryError::MissingColon { line: 3 });
    }

    #[test]
    fn test_duplicate_field() {
        let err = parse_query("lr: 1\n lr : 2").unwrap_err();
        assert_eq!(
            err,
            QueryError::DuplicateField { field: "config.lr".to_string(), line: 2 }
        );
    }

    #[test]
    fn test_malformed_alternatives() {
        let err = parse_query("seed: [[1, 2]").unwrap_err();
        assert_eq!(err, QueryError::MalformedAlternatives { line: 1 });
        assert_eq!(
            err.to_string(),
            "illegal 'or' condition (required format [ ... ]) in line 1"
        );
    }

    #[test]
    fn test_help_text_mentions_every_form() {
        for form in ["param : value", "[ val1, val2, ... ]", "/reg.*exp/", "param : ---"] {
            assert!(HELP_TEXT.contains(form), "{form}");
        }
    }
}
