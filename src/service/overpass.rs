use super::{FeatureRequest, Selection, TagClause, TagValue};

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn clause_filter(clause: &TagClause) -> String {
    let key = quote(&clause.key);
    match &clause.value {
        TagValue::Any => format!("[{}]", key),
        TagValue::Exact(value) => format!("[{}={}]", key, quote(value)),
        TagValue::OneOf(values) => {
            let alternatives: Vec<String> = values.iter()
                .map(|value| regex::escape(value))
                .collect();
            format!("[{}~{}]", key, quote(&format!("^({})$", alternatives.join("|"))))
        },
    }
}

/// Overpass QL for a request. Output is XML with every referenced way and node
/// recursed in, so geometry can be rebuilt from the response alone.
pub fn build_query(request: &FeatureRequest, timeout_secs: u64) -> String {
    let extent = request.extent.to_overpass();
    let (element, extra) = match request.selection {
        Selection::Features => ("nwr", ""),
        Selection::Roads => ("way", "[\"area\"!~\"yes\"]"),
    };

    let mut query = format!("[out:xml][timeout:{}];\n(\n", timeout_secs);
    for clause in &request.filter.clauses {
        query.push_str(&format!("  {}{}{}({});\n", element, clause_filter(clause), extra, extent));
    }
    query.push_str(");\n(._;>;);\nout body;\n");
    query
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::place::{BoundingBox, QueryExtent};
    use crate::service::TagFilter;

    #[test]
    fn feature_query_by_area() {
        let request = FeatureRequest {
            extent: QueryExtent::Named { area_id: 3_600_134_591 },
            filter: TagFilter::new().equals("leisure", "park").equals("landuse", "grass"),
            selection: Selection::Features,
        };
        assert_eq!(
            build_query(&request, 180),
            "[out:xml][timeout:180];\n(\n  \
             nwr[\"leisure\"=\"park\"](area:3600134591);\n  \
             nwr[\"landuse\"=\"grass\"](area:3600134591);\n\
             );\n(._;>;);\nout body;\n"
        );
    }

    #[test]
    fn road_query_by_bbox() {
        let bbox = BoundingBox { north: 41.925359, south: 41.821333, east: -87.582386, west: -87.6866 };
        let request = FeatureRequest {
            extent: QueryExtent::BoundingBox(bbox),
            filter: TagFilter::new().one_of("highway", &["motorway", "motorway_link"]),
            selection: Selection::Roads,
        };
        let query = build_query(&request, 25);
        assert!(query.contains(
            "way[\"highway\"~\"^(motorway|motorway_link)$\"][\"area\"!~\"yes\"](41.821333,-87.6866,41.925359,-87.582386);"
        ));
    }

    #[test]
    fn values_are_quoted() {
        let clause = TagClause { key: "name".to_string(), value: TagValue::Exact("Say \"hi\"".to_string()) };
        assert_eq!(clause_filter(&clause), "[\"name\"=\"Say \\\"hi\\\"\"]");
    }
}
