#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::tests::support::{body_bytes, recipe_body, setup, PIXEL_PNG};

    #[tokio::test]
    async fn test_create_and_fetch_recipe() {
        let t = setup().await;
        let chef = t.create_user("chef", false).await;
        let breakfast = t.seed_tag("Breakfast", "#E26C2D", "breakfast").await;
        let eggs = t.seed_ingredient("eggs", "pcs").await;
        let milk = t.seed_ingredient("milk", "ml").await;

        let mut body = recipe_body("Omelette", &[breakfast], &[(eggs, 3), (milk, 100)]);
        body["image"] = json!(PIXEL_PNG);
        let (status, recipe) = t.json("POST", "/api/recipes/", Some(&chef.token), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", recipe);
        assert_eq!(recipe["name"], "Omelette");
        assert_eq!(recipe["author"]["username"], "chef");
        assert_eq!(recipe["tags"][0]["slug"], "breakfast");
        assert_eq!(recipe["ingredients"][0], json!({ "id": eggs, "name": "eggs", "measurement_unit": "pcs", "amount": 3 }));
        assert_eq!(recipe["is_favorited"], false);

        // The stored image is served back from the media route
        let image = recipe["image"].as_str().unwrap().to_string();
        assert!(image.starts_with("/media/recipes/images/"));
        let response = t.send("GET", &image, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_bytes(response).await[1..4], b"PNG");

        let id = recipe["id"].as_i64().unwrap();
        let (status, fetched) = t.json("GET", &format!("/api/recipes/{}/", id), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["ingredients"].as_array().unwrap().len(), 2);
        assert_eq!(t.state.metrics.get_snapshot().recipes_created, 1);

        let (status, _) = t.json("GET", "/api/recipes/9999/", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_recipe_validation() {
        let t = setup().await;
        let chef = t.create_user("chef", false).await;
        let tag = t.seed_tag("Lunch", "#49B64E", "lunch").await;
        let flour = t.seed_ingredient("flour", "g").await;

        let (status, _) =
            t.json("POST", "/api/recipes/", None, Some(recipe_body("Bread", &[tag], &[(flour, 500)]))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut missing_name = recipe_body("Bread", &[tag], &[(flour, 500)]);
        missing_name.as_object_mut().unwrap().remove("name");
        let mut bad_time = recipe_body("Bread", &[tag], &[(flour, 500)]);
        bad_time["cooking_time"] = json!(0);
        let mut bad_image = recipe_body("Bread", &[tag], &[(flour, 500)]);
        bad_image["image"] = json!("data:text/plain;base64,aGVsbG8=");

        let cases = [
            recipe_body("Bread", &[tag, tag], &[(flour, 500)]),
            recipe_body("Bread", &[9999], &[(flour, 500)]),
            recipe_body("Bread", &[tag], &[]),
            recipe_body("Bread", &[tag], &[(flour, 1), (flour, 2)]),
            recipe_body("Bread", &[tag], &[(9999, 1)]),
            recipe_body("Bread", &[tag], &[(flour, 0)]),
            recipe_body("Bread", &[tag], &[(flour, 40_000)]),
            recipe_body("", &[tag], &[(flour, 500)]),
            missing_name,
            bad_time,
            bad_image,
        ];
        for body in cases {
            let (status, _) = t.json("POST", "/api/recipes/", Some(&chef.token), Some(body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "accepted {}", body);
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM recipes").fetch_one(&t.state.db).await.unwrap();
        assert_eq!(count, 0);
        let lines: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recipe_ingredients").fetch_one(&t.state.db).await.unwrap();
        assert_eq!(lines, 0);
    }

    #[tokio::test]
    async fn test_update_replaces_associations() {
        let t = setup().await;
        let chef = t.create_user("chef", false).await;
        let other = t.create_user("other", false).await;
        let lunch = t.seed_tag("Lunch", "#49B64E", "lunch").await;
        let dinner = t.seed_tag("Dinner", "#8775D2", "dinner").await;
        let rice = t.seed_ingredient("rice", "g").await;
        let peas = t.seed_ingredient("peas", "g").await;
        let id = t.create_recipe(&chef, "Risotto", &[lunch], &[(rice, 200)]).await;
        let uri = format!("/api/recipes/{}/", id);

        let patch = json!({ "tags": [dinner], "ingredients": [{ "id": peas, "amount": 50 }], "cooking_time": 40 });
        let (status, _) = t.json("PATCH", &uri, Some(&other.token), Some(patch.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, updated) = t.json("PATCH", &uri, Some(&chef.token), Some(patch)).await;
        assert_eq!(status, StatusCode::OK, "{}", updated);
        assert_eq!(updated["name"], "Risotto");
        assert_eq!(updated["cooking_time"], 40);
        assert_eq!(updated["tags"].as_array().unwrap().len(), 1);
        assert_eq!(updated["tags"][0]["id"], dinner);
        assert_eq!(updated["ingredients"][0]["id"], peas);
        assert_eq!(updated["ingredients"].as_array().unwrap().len(), 1);

        // Tags and ingredients are mandatory on update
        let (status, _) = t.json("PATCH", &uri, Some(&chef.token), Some(json!({ "name": "Plain rice" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // A rejected update leaves the stored associations alone
        let broken = json!({ "tags": [lunch], "ingredients": [{ "id": rice, "amount": 0 }] });
        let (status, _) = t.json("PUT", &uri, Some(&chef.token), Some(broken)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (_, current) = t.json("GET", &uri, None, None).await;
        assert_eq!(current["tags"][0]["id"], dinner);
        assert_eq!(current["ingredients"][0]["amount"], 50);

        let (status, _) = t.json("PATCH", "/api/recipes/9999/", Some(&chef.token), Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_image_replaces_file() {
        let t = setup().await;
        let chef = t.create_user("chef", false).await;
        let salt = t.seed_ingredient("salt", "g").await;

        let mut body = recipe_body("Soup", &[], &[(salt, 5)]);
        body["image"] = json!(PIXEL_PNG);
        let (_, recipe) = t.json("POST", "/api/recipes/", Some(&chef.token), Some(body)).await;
        let uri = format!("/api/recipes/{}/", recipe["id"]);
        let old_image = recipe["image"].as_str().unwrap().to_string();

        // Without an image the stored one stays
        let keep = json!({ "tags": [], "ingredients": [{ "id": salt, "amount": 7 }], "name": "Salty soup" });
        let (status, kept) = t.json("PATCH", &uri, Some(&chef.token), Some(keep)).await;
        assert_eq!(status, StatusCode::OK, "{}", kept);
        assert_eq!(kept["image"], old_image.as_str());
        assert_eq!(t.send("GET", &old_image, None, None).await.status(), StatusCode::OK);

        let replace = json!({ "tags": [], "ingredients": [{ "id": salt, "amount": 7 }], "image": PIXEL_PNG });
        let (status, replaced) = t.json("PATCH", &uri, Some(&chef.token), Some(replace)).await;
        assert_eq!(status, StatusCode::OK, "{}", replaced);
        let new_image = replaced["image"].as_str().unwrap().to_string();
        assert_ne!(new_image, old_image);
        assert_eq!(replaced["name"], "Salty soup");

        let response = t.send("GET", &new_image, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&body_bytes(response).await[1..4], b"PNG");
        assert_eq!(t.send("GET", &old_image, None, None).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_orders_names_ignoring_case() {
        let t = setup().await;
        let chef = t.create_user("chef", false).await;
        let water = t.seed_ingredient("вода", "мл").await;
        for name in ["Щи", "борщ", "Банан", "арбуз"] {
            t.create_recipe(&chef, name, &[], &[(water, 100)]).await;
        }

        let (_, page) = t.json("GET", "/api/recipes/", None, None).await;
        let names: Vec<&str> = page["results"].as_array().unwrap().iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["арбуз", "Банан", "борщ", "Щи"]);
    }

    #[tokio::test]
    async fn test_delete_recipe() {
        let t = setup().await;
        let chef = t.create_user("chef", false).await;
        let other = t.create_user("other", false).await;
        let salt = t.seed_ingredient("salt", "g").await;

        let mut body = recipe_body("Soup", &[], &[(salt, 5)]);
        body["image"] = json!(PIXEL_PNG);
        let (_, recipe) = t.json("POST", "/api/recipes/", Some(&chef.token), Some(body)).await;
        let id = recipe["id"].as_i64().unwrap();
        let image = recipe["image"].as_str().unwrap().to_string();
        let uri = format!("/api/recipes/{}/", id);
        t.json("POST", &format!("/api/recipes/{}/favorite/", id), Some(&other.token), None).await;

        let (status, _) = t.json("DELETE", &uri, Some(&other.token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = t.json("DELETE", &uri, Some(&chef.token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = t.json("GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let favorites: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites").fetch_one(&t.state.db).await.unwrap();
        assert_eq!(favorites, 0);
        let response = t.send("GET", &image, None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let t = setup().await;
        let alice = t.create_user("alice", false).await;
        let bob = t.create_user("bob", false).await;
        let lunch = t.seed_tag("Lunch", "#49B64E", "lunch").await;
        let dinner = t.seed_tag("Dinner", "#8775D2", "dinner").await;
        let water = t.seed_ingredient("water", "ml").await;

        let pasta = t.create_recipe(&alice, "Pasta", &[lunch], &[(water, 500)]).await;
        let curry = t.create_recipe(&alice, "Curry", &[dinner], &[(water, 200)]).await;
        t.create_recipe(&bob, "Salad", &[], &[(water, 10)]).await;

        let (status, page) = t.json("GET", "/api/recipes/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["count"], 3);
        let names: Vec<&str> = page["results"].as_array().unwrap().iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Curry", "Pasta", "Salad"]);

        let (_, page) = t.json("GET", &format!("/api/recipes/?author={}", alice.id), None, None).await;
        assert_eq!(page["count"], 2);

        let (_, page) = t.json("GET", "/api/recipes/?tags=lunch&tags=dinner", None, None).await;
        assert_eq!(page["count"], 2);
        let (_, page) = t.json("GET", "/api/recipes/?tags=unknown", None, None).await;
        assert_eq!(page["count"], 0);

        t.json("POST", &format!("/api/recipes/{}/favorite/", pasta), Some(&bob.token), None).await;
        t.json("POST", &format!("/api/recipes/{}/shopping_cart/", curry), Some(&bob.token), None).await;

        let (_, page) = t.json("GET", "/api/recipes/?is_favorited=1", Some(&bob.token), None).await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["id"], pasta);
        assert_eq!(page["results"][0]["is_favorited"], true);
        let (_, page) = t.json("GET", "/api/recipes/?is_in_shopping_cart=1", Some(&bob.token), None).await;
        assert_eq!(page["count"], 1);
        assert_eq!(page["results"][0]["id"], curry);

        // Anonymous viewers have no lists, so the flags are ignored
        let (_, page) = t.json("GET", "/api/recipes/?is_favorited=1", None, None).await;
        assert_eq!(page["count"], 3);

        let (_, page) = t.json("GET", "/api/recipes/?limit=2&page=2", None, None).await;
        assert_eq!(page["results"].as_array().unwrap().len(), 1);
        assert_eq!(page["previous"], "http://testserver/api/recipes/?limit=2");
        assert!(page["next"].is_null());

        let (status, _) = t.json("GET", "/api/recipes/?limit=2&page=5", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
