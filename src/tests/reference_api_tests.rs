#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::tests::support::setup;

    fn search_uri(prefix: &str) -> String {
        format!("/api/ingredients/?{}", serde_urlencoded::to_string([("name", prefix)]).unwrap())
    }

    #[tokio::test]
    async fn test_tags_are_staff_writable() {
        let t = setup().await;
        let staff = t.create_user("admin", true).await;
        let user = t.create_user("user", false).await;
        let tag = json!({ "name": "Breakfast", "color": "#e26c2d", "slug": "breakfast" });

        let (status, _) = t.json("POST", "/api/tags/", None, Some(tag.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = t.json("POST", "/api/tags/", Some(&user.token), Some(tag.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, created) = t.json("POST", "/api/tags/", Some(&staff.token), Some(tag.clone())).await;
        assert_eq!(status, StatusCode::CREATED, "{}", created);
        assert_eq!(created["color"], "#E26C2D");
        let id = created["id"].as_i64().unwrap();

        let (status, _) = t.json("POST", "/api/tags/", Some(&staff.token), Some(tag)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let bad_color = json!({ "name": "Lunch", "color": "green", "slug": "lunch" });
        let (status, _) = t.json("POST", "/api/tags/", Some(&staff.token), Some(bad_color)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let uri = format!("/api/tags/{}/", id);
        let (status, patched) =
            t.json("PATCH", &uri, Some(&staff.token), Some(json!({ "name": "Early breakfast" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["name"], "Early breakfast");
        assert_eq!(patched["slug"], "breakfast");

        let (status, tags) = t.json("GET", "/api/tags/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tags.as_array().unwrap().len(), 1);

        let (status, _) = t.json("DELETE", &uri, Some(&staff.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = t.json("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tag_list_ordering() {
        let t = setup().await;
        let b = t.seed_tag("Dinner", "#8775D2", "dinner").await;
        let a = t.seed_tag("Breakfast", "#E26C2D", "breakfast").await;

        let (_, tags) = t.json("GET", "/api/tags/", None, None).await;
        let ids: Vec<i64> = tags.as_array().unwrap().iter().map(|t| t["id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn test_ingredient_prefix_search() {
        let t = setup().await;
        for (name, unit) in [("sugar", "g"), ("Sugar syrup", "ml"), ("salt", "g"), ("brown sugar", "g")] {
            t.seed_ingredient(name, unit).await;
        }

        let (status, found) = t.json("GET", "/api/ingredients/?name=SUG", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = found.as_array().unwrap().iter().map(|i| i["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["sugar", "Sugar syrup"]);

        let (_, all) = t.json("GET", "/api/ingredients/", None, None).await;
        assert_eq!(all.as_array().unwrap().len(), 4);
        assert_eq!(all[0]["name"], "brown sugar");

        let (_, none) = t.json("GET", "/api/ingredients/?name=%25", None, None).await;
        assert!(none.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingredient_search_folds_unicode_case() {
        let t = setup().await;
        let staff = t.create_user("admin", true).await;
        t.seed_ingredient("Молоко", "мл").await;
        t.seed_ingredient("мука", "г").await;
        t.seed_ingredient("Соль", "г").await;

        let (_, found) = t.json("GET", &search_uri("мол"), None, None).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["name"], "Молоко");

        let (_, found) = t.json("GET", &search_uri("М"), None, None).await;
        let names: Vec<&str> = found.as_array().unwrap().iter().map(|i| i["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Молоко", "мука"]);

        // Renaming through the API keeps the search column in step
        let body = json!({ "name": "Сахар", "measurement_unit": "г" });
        let (status, sugar) = t.json("POST", "/api/ingredients/", Some(&staff.token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        let uri = format!("/api/ingredients/{}/", sugar["id"]);
        t.json("PATCH", &uri, Some(&staff.token), Some(json!({ "name": "Ёжевика" }))).await;
        let (_, found) = t.json("GET", &search_uri("ёж"), None, None).await;
        assert_eq!(found[0]["name"], "Ёжевика");
        let (_, found) = t.json("GET", &search_uri("сах"), None, None).await;
        assert!(found.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingredient_staff_crud() {
        let t = setup().await;
        let staff = t.create_user("admin", true).await;
        let chef = t.create_user("chef", false).await;

        let body = json!({ "name": "honey", "measurement_unit": "g" });
        let (status, _) = t.json("POST", "/api/ingredients/", Some(&chef.token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, honey) = t.json("POST", "/api/ingredients/", Some(&staff.token), Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = t.json("POST", "/api/ingredients/", Some(&staff.token), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let id = honey["id"].as_i64().unwrap();
        let uri = format!("/api/ingredients/{}/", id);
        let (status, patched) =
            t.json("PATCH", &uri, Some(&staff.token), Some(json!({ "measurement_unit": "tbsp" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["measurement_unit"], "tbsp");

        // In use by a recipe, so it cannot go
        t.create_recipe(&chef, "Tea", &[], &[(id, 1)]).await;
        let (status, _) = t.json("DELETE", &uri, Some(&staff.token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let spare = t.seed_ingredient("spare", "g").await;
        let (status, _) = t.json("DELETE", &format!("/api/ingredients/{}/", spare), Some(&staff.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = t.json("GET", &format!("/api/ingredients/{}/", spare), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
