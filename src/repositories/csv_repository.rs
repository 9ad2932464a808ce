use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::csv_transform::{self, Entity as CsvTransform, Model as TransformModel};
use crate::entities::csv_upload::{Entity as CsvUpload, Model as UploadModel};
use crate::entities::csv_upload_batch::{self, Entity as CsvUploadBatch, Model as BatchModel};
use crate::errors::ServiceError;

use super::{BaseRepository, Repository};

/// Uploads, their validated batches, and transform run records.
#[async_trait]
pub trait CsvRepository: Send + Sync {
    async fn insert_upload(&self, upload: UploadModel) -> Result<UploadModel, ServiceError>;
    async fn find_upload(&self, id: Uuid) -> Result<Option<UploadModel>, ServiceError>;
    async fn insert_batch(&self, batch: BatchModel) -> Result<BatchModel, ServiceError>;
    /// Batches in `batch_number` order.
    async fn batches_for_upload(&self, upload_id: Uuid) -> Result<Vec<BatchModel>, ServiceError>;
    async fn insert_transform(&self, run: TransformModel) -> Result<TransformModel, ServiceError>;
    /// Final write of a run record; only the run that created it calls this.
    async fn finish_transform(&self, run: TransformModel) -> Result<TransformModel, ServiceError>;
    async fn transforms_for_upload(
        &self,
        upload_id: Uuid,
    ) -> Result<Vec<TransformModel>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct SeaOrmCsvRepository {
    base: BaseRepository,
}

impl SeaOrmCsvRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }
}

impl Repository for SeaOrmCsvRepository {
    fn get_db(&self) -> &DatabaseConnection {
        self.base.get_db()
    }
}

#[async_trait]
impl CsvRepository for SeaOrmCsvRepository {
    async fn insert_upload(&self, upload: UploadModel) -> Result<UploadModel, ServiceError> {
        Ok(upload.into_active_model().insert(self.get_db()).await?)
    }

    async fn find_upload(&self, id: Uuid) -> Result<Option<UploadModel>, ServiceError> {
        Ok(CsvUpload::find_by_id(id).one(self.get_db()).await?)
    }

    async fn insert_batch(&self, batch: BatchModel) -> Result<BatchModel, ServiceError> {
        Ok(batch.into_active_model().insert(self.get_db()).await?)
    }

    async fn batches_for_upload(&self, upload_id: Uuid) -> Result<Vec<BatchModel>, ServiceError> {
        Ok(CsvUploadBatch::find()
            .filter(csv_upload_batch::Column::UploadId.eq(upload_id))
            .order_by_asc(csv_upload_batch::Column::BatchNumber)
            .all(self.get_db())
            .await?)
    }

    async fn insert_transform(&self, run: TransformModel) -> Result<TransformModel, ServiceError> {
        Ok(run.into_active_model().insert(self.get_db()).await?)
    }

    async fn finish_transform(&self, run: TransformModel) -> Result<TransformModel, ServiceError> {
        // into_active_model marks every column Unchanged; force them all into the UPDATE.
        let active = run.into_active_model().reset_all();
        Ok(active.update(self.get_db()).await?)
    }

    async fn transforms_for_upload(
        &self,
        upload_id: Uuid,
    ) -> Result<Vec<TransformModel>, ServiceError> {
        Ok(CsvTransform::find()
            .filter(csv_transform::Column::UploadId.eq(upload_id))
            .order_by_asc(csv_transform::Column::StartedAt)
            .all(self.get_db())
            .await?)
    }
}
