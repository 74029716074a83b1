use crate::error::{AppError, AppResult};
use crate::models::*;
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct ProductService {
    pool: SqlitePool,
}

impl ProductService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 商品列表，顾客端只看到上架商品
    pub async fn list_products(
        &self,
        query: &ProductQuery,
        include_inactive: bool,
    ) -> AppResult<PaginatedResponse<Product>> {
        let params = PaginationParams::new(query.page, query.per_page);

        let mut conditions = Vec::new();
        if !include_inactive {
            conditions.push("is_active = 1".to_string());
        }
        if query.category.is_some() {
            conditions.push("category = ?".to_string());
        }
        if let Some(on_sale) = query.on_sale {
            conditions.push(format!("is_on_sale = {}", if on_sale { 1 } else { 0 }));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM products {where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(category) = &query.category {
            count_query = count_query.bind(category);
        }
        let total = count_query.fetch_one(&self.pool).await?;

        let list_sql = format!(
            "SELECT * FROM products {where_clause} ORDER BY created_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query_as::<_, Product>(&list_sql);
        if let Some(category) = &query.category {
            list_query = list_query.bind(category);
        }
        let products = list_query
            .bind(params.get_limit() as i64)
            .bind(params.get_offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok(PaginatedResponse::new(products, &params, total))
    }

    pub async fn get_product(&self, product_id: i64) -> AppResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ? AND is_active = 1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Product not found".to_string()))
    }

    pub async fn create_product(&self, request: CreateProductRequest) -> AppResult<Product> {
        if request.name.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Product name is required".to_string(),
            ));
        }
        if request.price < 0 || request.stock < 0 {
            return Err(AppError::ValidationError(
                "Price and stock must be non-negative".to_string(),
            ));
        }

        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, category, price, stock, is_on_sale)
            VALUES (?, ?, ?, ?, ?)
            RETURNING *
            "#,
        )
        .bind(request.name.trim())
        .bind(request.category.trim())
        .bind(request.price)
        .bind(request.stock)
        .bind(request.is_on_sale.unwrap_or(false))
        .fetch_one(&self.pool)
        .await?;

        log::info!("Product {} created (id={})", product.name, product.id);
        Ok(product)
    }

    pub async fn update_product(
        &self,
        product_id: i64,
        request: UpdateProductRequest,
    ) -> AppResult<Product> {
        if let Some(price) = request.price
            && price < 0
        {
            return Err(AppError::ValidationError(
                "Price must be non-negative".to_string(),
            ));
        }
        if let Some(stock) = request.stock
            && stock < 0
        {
            return Err(AppError::ValidationError(
                "Stock must be non-negative".to_string(),
            ));
        }

        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = COALESCE(?, name),
                category = COALESCE(?, category),
                price = COALESCE(?, price),
                stock = COALESCE(?, stock),
                is_on_sale = COALESCE(?, is_on_sale),
                is_active = COALESCE(?, is_active),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(&request.name)
        .bind(&request.category)
        .bind(request.price)
        .bind(request.stock)
        .bind(request.is_on_sale)
        .bind(request.is_active)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product not found".to_string()));
        }

        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = ?")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await
            .map_err(Into::into)
    }

    /// 下架而非物理删除，保留历史订单的关联
    pub async fn delete_product(&self, product_id: i64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Product not found".to_string()));
        }

        log::info!("Product {product_id} deactivated");
        Ok(())
    }
}
