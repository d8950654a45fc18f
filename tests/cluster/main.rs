mod test_cluster;
